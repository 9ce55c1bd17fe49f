//! 通知器（Advisor）
//!
//! 通知器把一个通知与它的适用条件绑定在一起：
//! - [`PointcutAdvisor`]：切点 + 通知，按方法拦截
//! - [`IntroductionAdvisor`]：类型过滤器 + 引介接口，为目标增加能力

use crate::advice::{Advice, AdviceType, MethodInterceptor};
use crate::class_filter::{self, ClassFilter};
use crate::error::{AopError, AopResult};
use crate::pointcut::{self, Pointcut};
use std::fmt;
use std::sync::Arc;

/// 优先级常量，数字越小优先级越高
pub struct Ordered;

impl Ordered {
    pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;
    pub const LOWEST_PRECEDENCE: i32 = i32::MAX;
}

/// 切面声明元数据，仅供优先级排序使用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectMetadata {
    /// 切面名称
    pub aspect_name: String,
    /// 在切面内的声明顺序
    pub declaration_order: u32,
    /// 声明的通知类型
    pub advice_type: AdviceType,
}

impl AspectMetadata {
    pub fn new(aspect_name: impl Into<String>, declaration_order: u32, advice_type: AdviceType) -> Self {
        Self {
            aspect_name: aspect_name.into(),
            declaration_order,
            advice_type,
        }
    }
}

/// 切点通知器
#[derive(Clone)]
pub struct PointcutAdvisor {
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
    order: Option<i32>,
    aspect: Option<AspectMetadata>,
}

impl PointcutAdvisor {
    pub fn new(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self {
            pointcut,
            advice,
            order: None,
            aspect: None,
        }
    }

    /// 匹配所有方法的通知器
    pub fn always(advice: Advice) -> Self {
        Self::new(pointcut::TRUE.clone(), advice)
    }

    pub fn pointcut(&self) -> &Arc<dyn Pointcut> {
        &self.pointcut
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }
}

/// 引介拦截器
///
/// 对引介接口的方法直接处理，其余方法继续调用链
pub trait IntroductionInterceptor: MethodInterceptor {
    fn implements_interface(&self, interface: &str) -> bool;
}

/// 引介通知器
#[derive(Clone)]
pub struct IntroductionAdvisor {
    class_filter: Arc<dyn ClassFilter>,
    interfaces: Vec<String>,
    interceptor: Arc<dyn MethodInterceptor>,
    introduction: Arc<dyn IntroductionInterceptor>,
    order: Option<i32>,
    aspect: Option<AspectMetadata>,
}

impl IntroductionAdvisor {
    /// 创建引介通知器
    ///
    /// 拦截器必须实现声明的每一个接口，否则返回 `IntroductionConflict`
    pub fn new<I, S>(interceptor: I, interfaces: impl IntoIterator<Item = S>) -> AopResult<Self>
    where
        I: IntroductionInterceptor + 'static,
        S: Into<String>,
    {
        let interceptor = Arc::new(interceptor);
        let advisor = Self {
            class_filter: class_filter::TRUE.clone(),
            interfaces: interfaces.into_iter().map(Into::into).collect(),
            interceptor: interceptor.clone(),
            introduction: interceptor,
            order: None,
            aspect: None,
        };
        advisor.validate_interfaces()?;
        Ok(advisor)
    }

    /// 限制引介生效的目标类型
    pub fn with_class_filter(mut self, class_filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filter;
        self
    }

    pub fn validate_interfaces(&self) -> AopResult<()> {
        if self.interfaces.is_empty() {
            return Err(AopError::IntroductionConflict(format!(
                "introduction '{}' declares no interfaces",
                self.interceptor.name()
            )));
        }
        for interface in &self.interfaces {
            if !self.introduction.implements_interface(interface) {
                return Err(AopError::IntroductionConflict(format!(
                    "interceptor '{}' does not implement introduced interface '{}'",
                    self.interceptor.name(),
                    interface
                )));
            }
        }
        Ok(())
    }

    pub fn class_filter(&self) -> &Arc<dyn ClassFilter> {
        &self.class_filter
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        &self.interceptor
    }
}

/// 通知器
#[derive(Clone)]
pub enum Advisor {
    Pointcut(PointcutAdvisor),
    Introduction(IntroductionAdvisor),
}

impl Advisor {
    pub fn new(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Advisor::Pointcut(PointcutAdvisor::new(pointcut, advice))
    }

    /// 作用于所有方法
    pub fn always(advice: Advice) -> Self {
        Advisor::Pointcut(PointcutAdvisor::always(advice))
    }

    /// 设置显式优先级
    pub fn with_order(mut self, order: i32) -> Self {
        match &mut self {
            Advisor::Pointcut(a) => a.order = Some(order),
            Advisor::Introduction(a) => a.order = Some(order),
        }
        self
    }

    /// 设置切面元数据
    pub fn with_aspect(mut self, aspect: AspectMetadata) -> Self {
        match &mut self {
            Advisor::Pointcut(a) => a.aspect = Some(aspect),
            Advisor::Introduction(a) => a.aspect = Some(aspect),
        }
        self
    }

    pub fn order(&self) -> Option<i32> {
        match self {
            Advisor::Pointcut(a) => a.order,
            Advisor::Introduction(a) => a.order,
        }
    }

    /// 排序用的优先级，未声明时视为最低
    pub fn effective_order(&self) -> i32 {
        self.order().unwrap_or(Ordered::LOWEST_PRECEDENCE)
    }

    pub fn aspect(&self) -> Option<&AspectMetadata> {
        match self {
            Advisor::Pointcut(a) => a.aspect.as_ref(),
            Advisor::Introduction(a) => a.aspect.as_ref(),
        }
    }

    /// 通知类型：优先取切面元数据中的声明，否则按通知形态推断
    pub fn advice_type(&self) -> AdviceType {
        if let Some(aspect) = self.aspect() {
            return aspect.advice_type;
        }
        match self {
            Advisor::Pointcut(a) => a.advice.advice_type(),
            Advisor::Introduction(_) => AdviceType::Around,
        }
    }

    pub fn is_introduction(&self) -> bool {
        matches!(self, Advisor::Introduction(_))
    }

    pub fn describe(&self) -> String {
        let body = match self {
            Advisor::Pointcut(a) => a.advice.describe(),
            Advisor::Introduction(a) => format!("introduction of [{}]", a.interfaces.join(", ")),
        };
        match self.aspect() {
            Some(aspect) => format!("{}#{} {}", aspect.aspect_name, aspect.declaration_order, body),
            None => body,
        }
    }
}

impl From<PointcutAdvisor> for Advisor {
    fn from(advisor: PointcutAdvisor) -> Self {
        Advisor::Pointcut(advisor)
    }
}

impl From<IntroductionAdvisor> for Advisor {
    fn from(advisor: IntroductionAdvisor) -> Self {
        Advisor::Introduction(advisor)
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("advice", &self.describe())
            .field("order", &self.order())
            .finish()
    }
}
