//! 通知适配器注册表
//!
//! 把各种形态的通知统一转换为 [`MethodInterceptor`]。内置前置、返回后、
//! 异常三种适配器；环绕通知本身就是拦截器，直接透传。

use crate::advice::{Advice, AfterReturningAdvice, MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice, ThrowsOutcome};
use crate::advisor::{Advisor, PointcutAdvisor};
use crate::error::{AopError, AopResult};
use crate::joinpoint::MethodInvocation;
use crate::metadata::Value;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// 未经规整的通知对象
#[derive(Clone, Debug)]
pub enum RawAdvice {
    Advisor(Advisor),
    Advice(Advice),
}

impl From<Advisor> for RawAdvice {
    fn from(advisor: Advisor) -> Self {
        RawAdvice::Advisor(advisor)
    }
}

impl From<Advice> for RawAdvice {
    fn from(advice: Advice) -> Self {
        RawAdvice::Advice(advice)
    }
}

/// 通知适配器
///
/// 注册后可以支持新的通知形态（通过 [`Advice::Custom`]）
pub trait AdvisorAdapter: Send + Sync {
    fn supports_advice(&self, advice: &Advice) -> bool;

    fn get_interceptor(&self, advisor: &PointcutAdvisor) -> AopResult<Arc<dyn MethodInterceptor>>;
}

/// 前置通知适配器
#[derive(Debug, Default)]
pub struct MethodBeforeAdviceAdapter;

impl AdvisorAdapter for MethodBeforeAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Before(_))
    }

    fn get_interceptor(&self, advisor: &PointcutAdvisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::Before(advice) => Ok(Arc::new(MethodBeforeAdviceInterceptor::new(advice.clone()))),
            other => Err(AopError::UnknownAdviceType(other.describe())),
        }
    }
}

/// 返回后通知适配器
#[derive(Debug, Default)]
pub struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterReturning(_))
    }

    fn get_interceptor(&self, advisor: &PointcutAdvisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::AfterReturning(advice) => Ok(Arc::new(AfterReturningAdviceInterceptor::new(advice.clone()))),
            other => Err(AopError::UnknownAdviceType(other.describe())),
        }
    }
}

/// 异常通知适配器
#[derive(Debug, Default)]
pub struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Throws(_))
    }

    fn get_interceptor(&self, advisor: &PointcutAdvisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::Throws(advice) => Ok(Arc::new(ThrowsAdviceInterceptor::new(advice.clone()))),
            other => Err(AopError::UnknownAdviceType(other.describe())),
        }
    }
}

/// 前置通知拦截器：先执行通知，再继续调用链，返回值原样返回
pub struct MethodBeforeAdviceInterceptor {
    advice: Arc<dyn MethodBeforeAdvice>,
}

impl MethodBeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn MethodBeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for MethodBeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        self.advice.before(invocation)?;
        invocation.proceed()
    }
}

/// 返回后通知拦截器：先继续调用链，成功后执行通知，通知的结果被丢弃
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        let value = invocation.proceed()?;
        self.advice.after_returning(&value, invocation)?;
        Ok(value)
    }
}

/// 异常通知拦截器
///
/// 失败时分派到最具体的处理器；没有处理器匹配时原样抛出
pub struct ThrowsAdviceInterceptor {
    advice: Arc<ThrowsAdvice>,
}

impl ThrowsAdviceInterceptor {
    pub fn new(advice: Arc<ThrowsAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        let error = match invocation.proceed() {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match self.advice.handle(&error, invocation) {
            None | Some(Ok(ThrowsOutcome::Rethrow)) => Err(error),
            Some(Ok(ThrowsOutcome::Recover(value))) => Ok(value),
            Some(Err(translated)) => Err(translated),
        }
    }

    fn name(&self) -> &str {
        self.advice.name()
    }
}

/// 全局适配器注册表
static GLOBAL_ADAPTER_REGISTRY: Lazy<Arc<AdvisorAdapterRegistry>> = Lazy::new(|| Arc::new(AdvisorAdapterRegistry::new()));

/// 通知适配器注册表
pub struct AdvisorAdapterRegistry {
    adapters: RwLock<Vec<Arc<dyn AdvisorAdapter>>>,
}

impl AdvisorAdapterRegistry {
    /// 创建注册表，内置三种适配器已注册
    pub fn new() -> Self {
        let adapters: Vec<Arc<dyn AdvisorAdapter>> = vec![
            Arc::new(MethodBeforeAdviceAdapter),
            Arc::new(AfterReturningAdviceAdapter),
            Arc::new(ThrowsAdviceAdapter),
        ];
        Self {
            adapters: RwLock::new(adapters),
        }
    }

    /// 获取全局注册表
    pub fn global() -> Arc<AdvisorAdapterRegistry> {
        GLOBAL_ADAPTER_REGISTRY.clone()
    }

    /// 注册新的适配器
    pub fn register_adapter(&self, adapter: Arc<dyn AdvisorAdapter>) {
        self.adapters.write().push(adapter);
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.read().len()
    }

    fn is_supported(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Around(_)) || self.adapters.read().iter().any(|a| a.supports_advice(advice))
    }

    /// 把通知规整为通知器
    ///
    /// 已是通知器的原样返回；可识别的通知包装为匹配所有方法的通知器
    pub fn wrap(&self, raw: impl Into<RawAdvice>) -> AopResult<Advisor> {
        match raw.into() {
            RawAdvice::Advisor(advisor) => Ok(advisor),
            RawAdvice::Advice(advice) => {
                if self.is_supported(&advice) {
                    Ok(Advisor::always(advice))
                } else {
                    Err(AopError::UnknownAdviceType(advice.describe()))
                }
            }
        }
    }

    /// 把通知器转换为一个或多个环绕拦截器
    pub fn get_interceptors(&self, advisor: &Advisor) -> AopResult<Vec<Arc<dyn MethodInterceptor>>> {
        let advisor = match advisor {
            Advisor::Introduction(intro) => return Ok(vec![intro.interceptor().clone()]),
            Advisor::Pointcut(pa) => pa,
        };

        let mut interceptors = Vec::new();
        if let Advice::Around(interceptor) = advisor.advice() {
            interceptors.push(interceptor.clone());
        }
        for adapter in self.adapters.read().iter() {
            if adapter.supports_advice(advisor.advice()) {
                interceptors.push(adapter.get_interceptor(advisor)?);
            }
        }

        if interceptors.is_empty() {
            return Err(AopError::UnknownAdviceType(advisor.advice().describe()));
        }
        Ok(interceptors)
    }
}

impl Default for AdvisorAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{after_returning_fn, before_fn, interceptor_fn, CustomAdvice};

    #[test]
    fn test_wrap_passes_advisors_through() {
        let registry = AdvisorAdapterRegistry::new();
        let advisor = Advisor::always(Advice::before(before_fn(|_| Ok(())))).with_order(3);
        let wrapped = registry.wrap(advisor).unwrap();
        assert_eq!(wrapped.order(), Some(3));
    }

    #[test]
    fn test_wrap_recognized_shapes() {
        let registry = AdvisorAdapterRegistry::new();
        assert!(registry.wrap(Advice::before(before_fn(|_| Ok(())))).is_ok());
        assert!(registry.wrap(Advice::after_returning(after_returning_fn(|_, _| Ok(())))).is_ok());
        assert!(registry
            .wrap(Advice::around(interceptor_fn("noop", |inv| inv.proceed())))
            .is_ok());
    }

    #[test]
    fn test_unknown_custom_advice_is_rejected() {
        let registry = AdvisorAdapterRegistry::new();
        let advice = Advice::Custom(CustomAdvice::new("retry", 3u32));

        let err = registry.wrap(advice.clone()).unwrap_err();
        assert!(err.to_string().contains("retry"));
        let err = registry.get_interceptors(&Advisor::always(advice)).err().unwrap();
        assert!(matches!(err, AopError::UnknownAdviceType(_)));
    }

    struct RetryAdapter;

    impl AdvisorAdapter for RetryAdapter {
        fn supports_advice(&self, advice: &Advice) -> bool {
            matches!(advice, Advice::Custom(c) if c.payload::<u32>().is_some())
        }

        fn get_interceptor(&self, advisor: &PointcutAdvisor) -> AopResult<Arc<dyn MethodInterceptor>> {
            let attempts = match advisor.advice() {
                Advice::Custom(c) => *c.payload::<u32>().unwrap_or(&1),
                other => return Err(AopError::UnknownAdviceType(other.describe())),
            };
            Ok(Arc::new(interceptor_fn("retry", move |inv| {
                let mut last = None;
                for _ in 0..attempts {
                    match inv.proceed() {
                        Ok(v) => return Ok(v),
                        Err(e) => last = Some(e),
                    }
                }
                Err(last.unwrap_or_else(|| anyhow::anyhow!("no attempts")))
            })))
        }
    }

    #[test]
    fn test_registered_adapter_supports_custom_advice() {
        let registry = AdvisorAdapterRegistry::new();
        registry.register_adapter(Arc::new(RetryAdapter));
        assert_eq!(registry.adapter_count(), 4);

        let advisor = registry.wrap(Advice::Custom(CustomAdvice::new("retry", 3u32))).unwrap();
        let interceptors = registry.get_interceptors(&advisor).unwrap();
        assert_eq!(interceptors.len(), 1);
        assert_eq!(interceptors[0].name(), "retry");
    }
}
