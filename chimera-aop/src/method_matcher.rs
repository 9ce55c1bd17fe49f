//! 方法匹配器（MethodMatcher）
//!
//! 静态匹配只看方法签名与目标类型，结果可以缓存；
//! 动态匹配（`is_runtime() == true`）还要在每次调用时检查实际参数。

use crate::error::{AopError, AopResult};
use crate::metadata::{ClassInfo, MethodSignature, Value};
use crate::utils::pattern::any_match;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    /// 静态匹配
    ///
    /// `target_class` 为 `None` 时以方法的声明类型为准
    fn matches(&self, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool;

    /// 是否需要在每次调用时检查参数
    fn is_runtime(&self) -> bool {
        false
    }

    /// 动态匹配，仅在静态匹配已返回 true 且 `is_runtime()` 为 true 时调用
    fn matches_args(&self, method: &MethodSignature, _target_class: Option<&ClassInfo>, _args: &[Value]) -> bool {
        panic!(
            "MethodMatcher::matches_args() called on a static matcher for {}",
            method
        )
    }

    /// 若实现了引介感知匹配，返回对应视图
    fn as_introduction_aware(&self) -> Option<&dyn IntroductionAwareMethodMatcher> {
        None
    }
}

/// 引介感知的方法匹配器
///
/// 额外接收“目标是否带有引介接口”，没有引介时可以跳过接口来源检查
pub trait IntroductionAwareMethodMatcher: MethodMatcher {
    fn matches_with_introductions(
        &self,
        method: &MethodSignature,
        target_class: Option<&ClassInfo>,
        has_introductions: bool,
    ) -> bool;
}

/// 执行静态匹配，优先使用引介感知版本
pub fn matches_static(
    matcher: &dyn MethodMatcher,
    method: &MethodSignature,
    target_class: Option<&ClassInfo>,
    has_introductions: bool,
) -> bool {
    match matcher.as_introduction_aware() {
        Some(aware) => aware.matches_with_introductions(method, target_class, has_introductions),
        None => matcher.matches(method, target_class),
    }
}

/// 匹配所有方法
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &MethodSignature, _target_class: Option<&ClassInfo>) -> bool {
        true
    }
}

/// 进程级的“总是匹配”常量
pub static TRUE: Lazy<Arc<dyn MethodMatcher>> = Lazy::new(|| Arc::new(TrueMethodMatcher));

/// 按方法名匹配（支持 `*` 通配符）
#[derive(Debug, Clone, Default)]
pub struct NameMatchMethodMatcher {
    names: Vec<String>,
}

impl NameMatchMethodMatcher {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }
}

impl MethodMatcher for NameMatchMethodMatcher {
    fn matches(&self, method: &MethodSignature, _target_class: Option<&ClassInfo>) -> bool {
        any_match(&self.names, method.name())
    }
}

/// 正则匹配 `类型.方法` 形式的限定名
///
/// 目标类型存在时同时尝试目标类型名，以便匹配继承来的方法
#[derive(Debug, Clone)]
pub struct RegexMethodMatcher {
    patterns: Vec<Regex>,
    excluded: Vec<Regex>,
}

impl RegexMethodMatcher {
    pub fn new<I, S>(patterns: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            patterns: compile_all(patterns)?,
            excluded: Vec::new(),
        })
    }

    /// 设置排除模式，命中任一排除模式的方法不匹配
    pub fn with_excluded<I, S>(mut self, patterns: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded = compile_all(patterns)?;
        Ok(self)
    }

    fn matches_name(&self, name: &str) -> bool {
        self.patterns.iter().any(|r| r.is_match(name)) && !self.excluded.iter().any(|r| r.is_match(name))
    }
}

fn compile_all<I, S>(patterns: I) -> AopResult<Vec<Regex>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| Regex::new(p.as_ref()).map_err(|e| AopError::Config(format!("invalid method pattern '{}': {}", p.as_ref(), e))))
        .collect()
}

impl MethodMatcher for RegexMethodMatcher {
    fn matches(&self, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool {
        if self.matches_name(&method.qualified_name()) {
            return true;
        }
        match target_class {
            Some(class) if class.name() != method.declaring_type() => {
                self.matches_name(&format!("{}.{}", class.name(), method.name()))
            }
            _ => false,
        }
    }
}

type ArgsPredicate = dyn Fn(&MethodSignature, &[Value]) -> bool + Send + Sync;

/// 动态匹配器：静态部分通过后，再用闭包检查实际参数
pub struct ArgumentsMethodMatcher {
    static_part: Arc<dyn MethodMatcher>,
    predicate: Arc<ArgsPredicate>,
}

impl ArgumentsMethodMatcher {
    pub fn new<F>(static_part: Arc<dyn MethodMatcher>, predicate: F) -> Self
    where
        F: Fn(&MethodSignature, &[Value]) -> bool + Send + Sync + 'static,
    {
        Self {
            static_part,
            predicate: Arc::new(predicate),
        }
    }
}

impl MethodMatcher for ArgumentsMethodMatcher {
    fn matches(&self, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool {
        self.static_part.matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_args(&self, method: &MethodSignature, _target_class: Option<&ClassInfo>, args: &[Value]) -> bool {
        (self.predicate)(method, args)
    }
}

struct UnionMethodMatcher {
    a: Arc<dyn MethodMatcher>,
    b: Arc<dyn MethodMatcher>,
}

impl UnionMethodMatcher {
    fn side_matches_args(
        side: &dyn MethodMatcher,
        method: &MethodSignature,
        target_class: Option<&ClassInfo>,
        args: &[Value],
    ) -> bool {
        side.matches(method, target_class) && (!side.is_runtime() || side.matches_args(method, target_class, args))
    }
}

impl MethodMatcher for UnionMethodMatcher {
    fn matches(&self, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool {
        self.a.matches(method, target_class) || self.b.matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        self.a.is_runtime() || self.b.is_runtime()
    }

    fn matches_args(&self, method: &MethodSignature, target_class: Option<&ClassInfo>, args: &[Value]) -> bool {
        Self::side_matches_args(self.a.as_ref(), method, target_class, args)
            || Self::side_matches_args(self.b.as_ref(), method, target_class, args)
    }

    fn as_introduction_aware(&self) -> Option<&dyn IntroductionAwareMethodMatcher> {
        Some(self)
    }
}

impl IntroductionAwareMethodMatcher for UnionMethodMatcher {
    fn matches_with_introductions(
        &self,
        method: &MethodSignature,
        target_class: Option<&ClassInfo>,
        has_introductions: bool,
    ) -> bool {
        matches_static(self.a.as_ref(), method, target_class, has_introductions)
            || matches_static(self.b.as_ref(), method, target_class, has_introductions)
    }
}

struct IntersectionMethodMatcher {
    a: Arc<dyn MethodMatcher>,
    b: Arc<dyn MethodMatcher>,
}

impl MethodMatcher for IntersectionMethodMatcher {
    fn matches(&self, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool {
        self.a.matches(method, target_class) && self.b.matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        self.a.is_runtime() || self.b.is_runtime()
    }

    fn matches_args(&self, method: &MethodSignature, target_class: Option<&ClassInfo>, args: &[Value]) -> bool {
        let a = !self.a.is_runtime() || self.a.matches_args(method, target_class, args);
        let b = !self.b.is_runtime() || self.b.matches_args(method, target_class, args);
        a && b
    }

    fn as_introduction_aware(&self) -> Option<&dyn IntroductionAwareMethodMatcher> {
        Some(self)
    }
}

impl IntroductionAwareMethodMatcher for IntersectionMethodMatcher {
    fn matches_with_introductions(
        &self,
        method: &MethodSignature,
        target_class: Option<&ClassInfo>,
        has_introductions: bool,
    ) -> bool {
        matches_static(self.a.as_ref(), method, target_class, has_introductions)
            && matches_static(self.b.as_ref(), method, target_class, has_introductions)
    }
}

/// 方法匹配器组合工具
pub struct MethodMatchers;

impl MethodMatchers {
    /// 或运算；任一侧为动态时结果为动态
    pub fn union(a: Arc<dyn MethodMatcher>, b: Arc<dyn MethodMatcher>) -> Arc<dyn MethodMatcher> {
        Arc::new(UnionMethodMatcher { a, b })
    }

    /// 与运算；任一侧为动态时结果为动态
    pub fn intersection(a: Arc<dyn MethodMatcher>, b: Arc<dyn MethodMatcher>) -> Arc<dyn MethodMatcher> {
        Arc::new(IntersectionMethodMatcher { a, b })
    }
}
