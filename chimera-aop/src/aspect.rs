//! 切面（Aspect）定义
//!
//! 切面把一组通知声明组织在同一个名字下。每条声明按出现顺序编号，
//! 生成的通知器携带 (切面名, 声明顺序, 通知类型)，供优先级排序使用。
//!
//! ```
//! use chimera_aop::prelude::*;
//!
//! let aspect = AspectDefinition::new("AuditAspect")
//!     .order(10)
//!     .before(PointcutExpression::execution("* UserService.save*(..)"), |_| Ok(()))
//!     .after_returning(PointcutExpression::execution("* UserService.*(..)"), |_, _| Ok(()));
//!
//! assert_eq!(aspect.advisors().len(), 2);
//! ```

use crate::advice::{
    after_fn, after_returning_fn, before_fn, Advice, AdviceType, MethodInterceptor, ThrowsAdvice,
};
use crate::advisor::{Advisor, AspectMetadata, IntroductionAdvisor};
use crate::interceptor::AfterFinallyInterceptor;
use crate::joinpoint::MethodInvocation;
use crate::metadata::Value;
use crate::pointcut::{Pointcut, PointcutExpression};
use crate::utils::pattern;
use std::fmt;
use std::sync::Arc;

/// 切面定义
#[derive(Clone)]
pub struct AspectDefinition {
    name: String,
    order: Option<i32>,
    bean_patterns: Vec<String>,
    advisors: Vec<Advisor>,
}

impl AspectDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: None,
            bean_patterns: Vec::new(),
            advisors: Vec::new(),
        }
    }

    /// 切面整体的优先级
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 只对名称匹配的 Bean 生效（支持 `*` 通配符）
    pub fn for_beans<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bean_patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// 声明一条通知，声明顺序自动递增
    pub fn advise(mut self, pointcut: Arc<dyn Pointcut>, advice: Advice, advice_type: AdviceType) -> Self {
        let metadata = AspectMetadata::new(self.name.clone(), self.advisors.len() as u32, advice_type);
        self.advisors.push(Advisor::new(pointcut, advice).with_aspect(metadata));
        self
    }

    /// 前置通知
    pub fn before<F>(self, pointcut: PointcutExpression, func: F) -> Self
    where
        F: Fn(&MethodInvocation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.advise(pointcut.into_pointcut(), Advice::before(before_fn(func)), AdviceType::Before)
    }

    /// 返回后通知
    pub fn after_returning<F>(self, pointcut: PointcutExpression, func: F) -> Self
    where
        F: Fn(&Value, &MethodInvocation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.advise(
            pointcut.into_pointcut(),
            Advice::after_returning(after_returning_fn(func)),
            AdviceType::AfterReturning,
        )
    }

    /// 异常通知
    pub fn after_throwing(self, pointcut: PointcutExpression, advice: ThrowsAdvice) -> Self {
        self.advise(pointcut.into_pointcut(), Advice::throws(advice), AdviceType::AfterThrowing)
    }

    /// 后置通知（无论成功还是失败都执行）
    pub fn after<F>(self, pointcut: PointcutExpression, func: F) -> Self
    where
        F: Fn(&MethodInvocation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let interceptor = AfterFinallyInterceptor::new(Arc::new(after_fn(func)));
        self.advise(pointcut.into_pointcut(), Advice::around(interceptor), AdviceType::After)
    }

    /// 环绕通知
    pub fn around<I>(self, pointcut: PointcutExpression, interceptor: I) -> Self
    where
        I: MethodInterceptor + 'static,
    {
        self.advise(pointcut.into_pointcut(), Advice::around(interceptor), AdviceType::Around)
    }

    /// 引介
    pub fn introduce(mut self, advisor: IntroductionAdvisor) -> Self {
        let metadata = AspectMetadata::new(self.name.clone(), self.advisors.len() as u32, AdviceType::Around);
        self.advisors.push(Advisor::from(advisor).with_aspect(metadata));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_order(&self) -> Option<i32> {
        self.order
    }

    /// 切面是否适用于该 Bean
    pub fn matches_bean(&self, bean_name: &str) -> bool {
        self.bean_patterns.is_empty() || pattern::any_match(&self.bean_patterns, bean_name)
    }

    /// 声明的通知器，切面优先级已应用
    pub fn advisors(&self) -> Vec<Advisor> {
        self.advisors
            .iter()
            .map(|advisor| match self.order {
                Some(order) => advisor.clone().with_order(order),
                None => advisor.clone(),
            })
            .collect()
    }
}

impl fmt::Debug for AspectDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectDefinition")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("bean_patterns", &self.bean_patterns)
            .field("advisors", &self.advisors.len())
            .finish()
    }
}

/// 切面注册器
///
/// 用于 inventory 自动收集和注册切面
pub struct AspectRegistration {
    /// 切面名称
    pub name: &'static str,

    /// 创建切面定义的函数
    pub creator: fn() -> AspectDefinition,
}

impl AspectRegistration {
    pub const fn new(name: &'static str, creator: fn() -> AspectDefinition) -> Self {
        Self { name, creator }
    }

    /// 创建切面定义
    pub fn create_definition(&self) -> AspectDefinition {
        (self.creator)()
    }
}

// 使用 inventory 收集所有切面注册器
inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}
