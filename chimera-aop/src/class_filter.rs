//! 类型过滤器（ClassFilter）
//!
//! 判断一个通知是否可能作用于某个目标类型

use crate::metadata::ClassInfo;
use crate::utils::pattern::simple_match;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// 类型过滤器
///
/// 纯谓词，不得有副作用
pub trait ClassFilter: Send + Sync {
    fn matches(&self, class: &ClassInfo) -> bool;
}

/// 匹配所有类型
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueClassFilter;

impl ClassFilter for TrueClassFilter {
    fn matches(&self, _class: &ClassInfo) -> bool {
        true
    }
}

/// 进程级的“总是匹配”常量
pub static TRUE: Lazy<Arc<dyn ClassFilter>> = Lazy::new(|| Arc::new(TrueClassFilter));

/// 按类型名通配符匹配
///
/// 例如：`*Service`、`User*`
#[derive(Debug, Clone)]
pub struct TypeNameClassFilter {
    pattern: String,
}

impl TypeNameClassFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl ClassFilter for TypeNameClassFilter {
    fn matches(&self, class: &ClassInfo) -> bool {
        simple_match(&self.pattern, class.name())
    }
}

/// 匹配可赋值给根类型的所有类型（根类型本身、子类、实现类）
#[derive(Debug, Clone)]
pub struct RootClassFilter {
    root: String,
}

impl RootClassFilter {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
}

impl ClassFilter for RootClassFilter {
    fn matches(&self, class: &ClassInfo) -> bool {
        class.is_assignable_to(&self.root)
    }
}

struct UnionClassFilter(Vec<Arc<dyn ClassFilter>>);

impl ClassFilter for UnionClassFilter {
    fn matches(&self, class: &ClassInfo) -> bool {
        self.0.iter().any(|f| f.matches(class))
    }
}

struct IntersectionClassFilter(Vec<Arc<dyn ClassFilter>>);

impl ClassFilter for IntersectionClassFilter {
    fn matches(&self, class: &ClassInfo) -> bool {
        self.0.iter().all(|f| f.matches(class))
    }
}

struct NegateClassFilter(Arc<dyn ClassFilter>);

impl ClassFilter for NegateClassFilter {
    fn matches(&self, class: &ClassInfo) -> bool {
        !self.0.matches(class)
    }
}

/// 类型过滤器组合工具
pub struct ClassFilters;

impl ClassFilters {
    /// 或运算
    pub fn union(a: Arc<dyn ClassFilter>, b: Arc<dyn ClassFilter>) -> Arc<dyn ClassFilter> {
        Arc::new(UnionClassFilter(vec![a, b]))
    }

    /// 与运算
    pub fn intersection(a: Arc<dyn ClassFilter>, b: Arc<dyn ClassFilter>) -> Arc<dyn ClassFilter> {
        Arc::new(IntersectionClassFilter(vec![a, b]))
    }

    /// 非运算
    pub fn negate(filter: Arc<dyn ClassFilter>) -> Arc<dyn ClassFilter> {
        Arc::new(NegateClassFilter(filter))
    }
}
