//! 切点（Pointcut）
//!
//! 切点 = 类型过滤器 + 方法匹配器。除了组合式切点外，还提供
//! `execution(* UserService.save(..))` 风格的切点表达式。

use crate::class_filter::{self, ClassFilter, ClassFilters};
use crate::error::{AopError, AopResult};
use crate::metadata::{ClassInfo, MethodSignature, Value};
use crate::method_matcher::{self, IntroductionAwareMethodMatcher, MethodMatcher, MethodMatchers};
use crate::utils::pattern::simple_match;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// 切点 Trait
pub trait Pointcut: Send + Sync {
    fn class_filter(&self) -> Arc<dyn ClassFilter>;

    fn method_matcher(&self) -> Arc<dyn MethodMatcher>;
}

/// 匹配所有类型的所有方法
#[derive(Debug, Clone, Copy, Default)]
pub struct TruePointcut;

impl Pointcut for TruePointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        class_filter::TRUE.clone()
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        method_matcher::TRUE.clone()
    }
}

/// 进程级的“总是匹配”常量
pub static TRUE: Lazy<Arc<dyn Pointcut>> = Lazy::new(|| Arc::new(TruePointcut));

/// 可组合切点
#[derive(Clone)]
pub struct ComposablePointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl ComposablePointcut {
    /// 匹配所有方法的切点，作为组合的起点
    pub fn new() -> Self {
        Self {
            class_filter: class_filter::TRUE.clone(),
            method_matcher: method_matcher::TRUE.clone(),
        }
    }

    pub fn from_parts(class_filter: Arc<dyn ClassFilter>, method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self {
            class_filter,
            method_matcher,
        }
    }

    pub fn from_class_filter(class_filter: Arc<dyn ClassFilter>) -> Self {
        Self::from_parts(class_filter, method_matcher::TRUE.clone())
    }

    pub fn from_method_matcher(method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self::from_parts(class_filter::TRUE.clone(), method_matcher)
    }

    /// 与另一个类型过滤器取交集
    pub fn intersect_class_filter(mut self, other: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = ClassFilters::intersection(self.class_filter, other);
        self
    }

    /// 与另一个方法匹配器取交集
    pub fn intersect_method_matcher(mut self, other: Arc<dyn MethodMatcher>) -> Self {
        self.method_matcher = MethodMatchers::intersection(self.method_matcher, other);
        self
    }

    /// 与另一个切点取交集
    pub fn intersection(self, other: &dyn Pointcut) -> Self {
        self.intersect_class_filter(other.class_filter())
            .intersect_method_matcher(other.method_matcher())
    }

    /// 与另一个切点取并集
    ///
    /// 每一侧的方法匹配器只在该侧的类型过滤器通过时生效
    pub fn union(self, other: &dyn Pointcut) -> Self {
        let left: Arc<dyn MethodMatcher> = Arc::new(ClassFilterAwareMethodMatcher {
            class_filter: self.class_filter.clone(),
            matcher: self.method_matcher,
        });
        let right: Arc<dyn MethodMatcher> = Arc::new(ClassFilterAwareMethodMatcher {
            class_filter: other.class_filter(),
            matcher: other.method_matcher(),
        });
        Self {
            class_filter: ClassFilters::union(self.class_filter, other.class_filter()),
            method_matcher: MethodMatchers::union(left, right),
        }
    }
}

impl Default for ComposablePointcut {
    fn default() -> Self {
        Self::new()
    }
}

impl Pointcut for ComposablePointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        self.class_filter.clone()
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.method_matcher.clone()
    }
}

struct ClassFilterAwareMethodMatcher {
    class_filter: Arc<dyn ClassFilter>,
    matcher: Arc<dyn MethodMatcher>,
}

impl ClassFilterAwareMethodMatcher {
    fn class_matches(&self, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool {
        match target_class {
            Some(class) => self.class_filter.matches(class),
            None => self.class_filter.matches(&ClassInfo::new(method.declaring_type())),
        }
    }
}

impl MethodMatcher for ClassFilterAwareMethodMatcher {
    fn matches(&self, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool {
        self.class_matches(method, target_class) && self.matcher.matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        self.matcher.is_runtime()
    }

    fn matches_args(&self, method: &MethodSignature, target_class: Option<&ClassInfo>, args: &[Value]) -> bool {
        self.matcher.matches_args(method, target_class, args)
    }

    fn as_introduction_aware(&self) -> Option<&dyn IntroductionAwareMethodMatcher> {
        Some(self)
    }
}

impl IntroductionAwareMethodMatcher for ClassFilterAwareMethodMatcher {
    fn matches_with_introductions(
        &self,
        method: &MethodSignature,
        target_class: Option<&ClassInfo>,
        has_introductions: bool,
    ) -> bool {
        self.class_matches(method, target_class)
            && method_matcher::matches_static(self.matcher.as_ref(), method, target_class, has_introductions)
    }
}

type ExpressionFn = dyn Fn(&MethodSignature, Option<&ClassInfo>) -> bool + Send + Sync;
type ArgsFn = dyn Fn(&[Value]) -> bool + Send + Sync;

/// 切点表达式
///
/// 类型模式匹配方法的声明类型，或目标类型及其父类、接口的名称；
/// 以 `+` 结尾的类型模式匹配该类型及其所有子类型。
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配特定类型的所有方法
    /// 例如：TypePattern("UserService")
    TypePattern(String),

    /// 匹配特定方法名
    /// 例如：MethodPattern("get_user")
    MethodPattern(String),

    /// 匹配特定类型的特定方法
    /// 例如：execution(* UserService.get_user(..))
    Execution {
        type_pattern: String,
        method_pattern: String,
        /// `None` 表示 `(..)`，即任意参数
        params: Option<Vec<String>>,
    },

    /// 使用正则表达式匹配类型
    TypeRegex(Regex),

    /// 使用正则表达式匹配方法
    MethodRegex(Regex),

    /// 自定义匹配函数
    Custom(Arc<ExpressionFn>),

    /// 按实际参数匹配（动态）
    Args(Arc<ArgsFn>),

    /// 与运算（AND）
    And(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 或运算（OR）
    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 非运算（NOT）
    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 检查方法是否匹配（动态部分视为匹配）
    pub fn matches(&self, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool {
        self.evaluate(method, target_class, None)
    }

    /// 检查方法与实际参数是否匹配
    pub fn matches_with_args(&self, method: &MethodSignature, target_class: Option<&ClassInfo>, args: &[Value]) -> bool {
        self.evaluate(method, target_class, Some(args))
    }

    fn evaluate(&self, method: &MethodSignature, target_class: Option<&ClassInfo>, args: Option<&[Value]>) -> bool {
        match self {
            PointcutExpression::All => true,

            PointcutExpression::TypePattern(pattern) => Self::type_matches(pattern, method, target_class),

            PointcutExpression::MethodPattern(pattern) => simple_match(pattern, method.name()),

            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
                params,
            } => {
                Self::type_matches(type_pattern, method, target_class)
                    && simple_match(method_pattern, method.name())
                    && params.as_ref().map_or(true, |p| params_match(p, method.parameter_types()))
            }

            PointcutExpression::TypeRegex(regex) => regex.is_match(Self::type_name(method, target_class)),

            PointcutExpression::MethodRegex(regex) => regex.is_match(method.name()),

            PointcutExpression::Custom(func) => func(method, target_class),

            PointcutExpression::Args(func) => args.map_or(true, |args| func(args)),

            PointcutExpression::And(left, right) => {
                left.evaluate(method, target_class, args) && right.evaluate(method, target_class, args)
            }

            PointcutExpression::Or(left, right) => {
                left.evaluate(method, target_class, args) || right.evaluate(method, target_class, args)
            }

            PointcutExpression::Not(expr) => match args {
                // 静态阶段无法否定动态条件，保守地视为可能匹配
                None if expr.is_runtime() => true,
                _ => !expr.evaluate(method, target_class, args),
            },
        }
    }

    /// 类型层面是否可能匹配
    pub fn could_match_class(&self, class: &ClassInfo) -> bool {
        match self {
            PointcutExpression::TypePattern(pattern) | PointcutExpression::Execution { type_pattern: pattern, .. } => {
                Self::class_pattern_matches(pattern, class)
            }
            PointcutExpression::TypeRegex(regex) => regex.is_match(class.name()),
            PointcutExpression::And(left, right) => left.could_match_class(class) && right.could_match_class(class),
            PointcutExpression::Or(left, right) => left.could_match_class(class) || right.could_match_class(class),
            _ => true,
        }
    }

    /// 是否包含需要检查参数的部分
    pub fn is_runtime(&self) -> bool {
        match self {
            PointcutExpression::Args(_) => true,
            PointcutExpression::And(left, right) | PointcutExpression::Or(left, right) => {
                left.is_runtime() || right.is_runtime()
            }
            PointcutExpression::Not(expr) => expr.is_runtime(),
            _ => false,
        }
    }

    fn type_name<'a>(method: &'a MethodSignature, target_class: Option<&'a ClassInfo>) -> &'a str {
        target_class.map_or(method.declaring_type(), |c| c.name())
    }

    // 声明类型或目标类型任一匹配即可
    fn type_matches(pattern: &str, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool {
        let declared = simple_match(pattern.trim_end_matches('+'), method.declaring_type());
        match target_class {
            Some(class) => declared || Self::class_pattern_matches(pattern, class),
            None => declared,
        }
    }

    /// 类型本身、父类链或实现的接口中有名称匹配
    fn class_pattern_matches(pattern: &str, class: &ClassInfo) -> bool {
        if let Some(root) = pattern.strip_suffix('+') {
            return class.is_assignable_to(root);
        }
        let mut current = Some(class);
        while let Some(c) = current {
            if simple_match(pattern, c.name()) {
                return true;
            }
            current = c.superclass().map(|s| &**s);
        }
        class.all_interfaces().iter().any(|i| simple_match(pattern, i))
    }

    /// 创建 execution 表达式
    ///
    /// 例如：execution("* UserService.get_user(..)")
    /// 格式：返回类型 类型名.方法名(参数)
    pub fn execution(expression: &str) -> Self {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        // 修饰符与返回类型在方法部分之前，方法部分从第一个含 '(' 的词开始
        match parts.iter().position(|p| p.contains('(')) {
            Some(start) => Self::execution_of(&parts[start..].join(" ")),
            None => match parts.last() {
                Some(last) => Self::execution_of(last),
                None => PointcutExpression::All,
            },
        }
    }

    fn execution_of(method_part: &str) -> Self {
        let (name_part, params) = match method_part.split_once('(') {
            Some((name, rest)) => {
                let inner = rest.trim_end_matches(')').trim();
                let params = if inner == ".." {
                    None
                } else if inner.is_empty() {
                    Some(Vec::new())
                } else {
                    Some(inner.split(',').map(|p| p.trim().to_string()).collect())
                };
                (name, params)
            }
            None => (method_part, None),
        };

        match name_part.rsplit_once('.') {
            Some((type_pattern, method_pattern)) => PointcutExpression::Execution {
                type_pattern: type_pattern.to_string(),
                method_pattern: method_pattern.to_string(),
                params,
            },
            None => match params {
                None => PointcutExpression::MethodPattern(name_part.to_string()),
                Some(params) => PointcutExpression::Execution {
                    type_pattern: "*".to_string(),
                    method_pattern: name_part.to_string(),
                    params: Some(params),
                },
            },
        }
    }

    /// 自定义匹配函数
    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(&MethodSignature, Option<&ClassInfo>) -> bool + Send + Sync + 'static,
    {
        PointcutExpression::Custom(Arc::new(func))
    }

    /// 按实际参数匹配
    pub fn args<F>(func: F) -> Self
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        PointcutExpression::Args(Arc::new(func))
    }

    /// 解析切点表达式
    ///
    /// 支持 `execution(..)`、`within(..)`、`&&`、`||`、`!` 与括号
    pub fn parse(expression: &str) -> AopResult<Self> {
        let mut parser = ExpressionParser {
            input: expression,
            pos: 0,
        };
        let expr = parser.parse_or()?;
        parser.skip_ws();
        if parser.pos < parser.input.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }

    /// 转换为切点
    pub fn into_pointcut(self) -> Arc<dyn Pointcut> {
        Arc::new(ExpressionPointcut(Arc::new(self)))
    }
}

/// 按参数模式匹配参数类型列表，`..` 匹配任意个（包括零个）参数
fn params_match(patterns: &[String], actual: &[String]) -> bool {
    match patterns.split_first() {
        None => actual.is_empty(),
        Some((first, rest)) if first == ".." => (0..=actual.len()).any(|skip| params_match(rest, &actual[skip..])),
        Some((first, rest)) => match actual.split_first() {
            Some((head, tail)) => simple_match(first, head) && params_match(rest, tail),
            None => false,
        },
    }
}

impl std::fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "All"),
            PointcutExpression::TypePattern(p) => write!(f, "TypePattern({})", p),
            PointcutExpression::MethodPattern(p) => write!(f, "MethodPattern({})", p),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
                params,
            } => match params {
                None => write!(f, "Execution({}.{}(..))", type_pattern, method_pattern),
                Some(p) => write!(f, "Execution({}.{}({}))", type_pattern, method_pattern, p.join(", ")),
            },
            PointcutExpression::TypeRegex(_) => write!(f, "TypeRegex(...)"),
            PointcutExpression::MethodRegex(_) => write!(f, "MethodRegex(...)"),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::Args(_) => write!(f, "Args(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 表达式切点：表达式同时充当类型过滤器和方法匹配器
struct ExpressionPointcut(Arc<PointcutExpression>);

impl Pointcut for ExpressionPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::new(ExpressionMatcher(self.0.clone()))
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::new(ExpressionMatcher(self.0.clone()))
    }
}

struct ExpressionMatcher(Arc<PointcutExpression>);

impl ClassFilter for ExpressionMatcher {
    fn matches(&self, class: &ClassInfo) -> bool {
        self.0.could_match_class(class)
    }
}

impl MethodMatcher for ExpressionMatcher {
    fn matches(&self, method: &MethodSignature, target_class: Option<&ClassInfo>) -> bool {
        self.0.matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        self.0.is_runtime()
    }

    fn matches_args(&self, method: &MethodSignature, target_class: Option<&ClassInfo>, args: &[Value]) -> bool {
        self.0.matches_with_args(method, target_class, args)
    }
}

struct ExpressionParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ExpressionParser<'a> {
    fn error(&self, message: &str) -> AopError {
        AopError::Config(format!(
            "invalid pointcut expression '{}' at {}: {}",
            self.input, self.pos, message
        ))
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> AopResult<PointcutExpression> {
        let mut expr = self.parse_and()?;
        while self.eat("||") {
            expr = expr.or(self.parse_and()?);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> AopResult<PointcutExpression> {
        let mut expr = self.parse_unary()?;
        while self.eat("&&") {
            expr = expr.and(self.parse_unary()?);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> AopResult<PointcutExpression> {
        if self.eat("!") {
            return Ok(self.parse_unary()?.not());
        }
        if self.eat("(") {
            let expr = self.parse_or()?;
            if !self.eat(")") {
                return Err(self.error("expected ')'"));
            }
            return Ok(expr);
        }
        self.parse_designator()
    }

    fn parse_designator(&mut self) -> AopResult<PointcutExpression> {
        self.skip_ws();
        let name_len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(self.rest().len());
        if name_len == 0 {
            return Err(self.error("expected a designator"));
        }
        let name = &self.rest()[..name_len];
        self.pos += name_len;

        if !self.eat("(") {
            return Err(self.error("expected '(' after designator"));
        }
        let body = self.balanced_body()?;

        match name {
            "execution" => Ok(PointcutExpression::execution(body)),
            "within" => Ok(PointcutExpression::TypePattern(body.trim().to_string())),
            "method" => Ok(PointcutExpression::MethodPattern(body.trim().to_string())),
            other => Err(self.error(&format!("unsupported designator '{}'", other))),
        }
    }

    /// 读取到与已消费的 '(' 配对的 ')'，返回括号内文本
    fn balanced_body(&mut self) -> AopResult<&'a str> {
        let start = self.pos;
        let mut depth = 1usize;
        for (offset, c) in self.rest().char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = &self.input[start..start + offset];
                        self.pos = start + offset + 1;
                        return Ok(body);
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses"))
    }
}
