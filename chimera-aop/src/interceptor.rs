//! 内置拦截器
//!
//! 常用的横切逻辑：调用日志、性能监控、异常日志、后置（finally）通知和引介委托。

use crate::advice::{AfterAdvice, MethodInterceptor, ThrowsAdvice, ThrowsOutcome};
use crate::advisor::IntroductionInterceptor;
use crate::config::AopProperties;
use crate::error_info::ErrorInfo;
use crate::joinpoint::MethodInvocation;
use crate::metadata::{Target, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 调用日志拦截器 - 记录方法进入与退出
#[derive(Debug, Clone, Default)]
pub struct TracingInterceptor {
    log_args: bool,
}

impl TracingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时记录参数类型
    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

impl MethodInterceptor for TracingInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        if self.log_args {
            tracing::info!("→ Entering: {} with {:?}", invocation.method(), invocation.arguments());
        } else {
            tracing::info!("→ Entering: {}", invocation.method());
        }

        let start = Instant::now();
        let result = invocation.proceed();
        match &result {
            Ok(_) => tracing::info!("← Exiting: {} (took {:?})", invocation.method(), start.elapsed()),
            Err(e) => tracing::info!(
                "← Exiting: {} with error '{}' (took {:?})",
                invocation.method(),
                e,
                start.elapsed()
            ),
        }
        result
    }

    fn name(&self) -> &str {
        "TracingInterceptor"
    }
}

/// 性能监控拦截器 - 超过阈值时告警
#[derive(Debug, Clone)]
pub struct PerformanceMonitorInterceptor {
    threshold: Duration,
}

impl PerformanceMonitorInterceptor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn from_properties(properties: &AopProperties) -> Self {
        Self::new(Duration::from_millis(properties.performance_threshold_ms))
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl MethodInterceptor for PerformanceMonitorInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        let start = Instant::now();
        let result = invocation.proceed();
        let elapsed = start.elapsed();
        if elapsed > self.threshold {
            tracing::warn!(
                "Slow method detected: {} took {}ms (threshold: {}ms)",
                invocation.method(),
                elapsed.as_millis(),
                self.threshold.as_millis()
            );
        } else {
            tracing::trace!("{} took {:?}", invocation.method(), elapsed);
        }
        result
    }

    fn name(&self) -> &str {
        "PerformanceMonitorInterceptor"
    }
}

/// 异常日志通知：记录错误及其原因链后原样抛出
pub fn exception_logging_advice() -> ThrowsAdvice {
    ThrowsAdvice::new("ExceptionLogging").on_any(|error, invocation| {
        let info = ErrorInfo::from_anyhow(error);
        tracing::error!(
            "Exception in {} [{}]: {} (root cause: {})",
            invocation.method(),
            info.error_type,
            info,
            info.root_cause()
        );
        Ok(ThrowsOutcome::Rethrow)
    })
}

/// 后置（finally）通知拦截器：无论成功还是失败都执行
pub struct AfterFinallyInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl AfterFinallyInterceptor {
    pub fn new(advice: Arc<dyn AfterAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterFinallyInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        let result = invocation.proceed();
        self.advice.after(invocation)?;
        result
    }
}

/// 委托式引介拦截器
///
/// 对引介接口上的方法直接调用委托对象，其余方法继续调用链。
/// 委托对象返回自身时替换为代理前端。
pub struct DelegatingIntroductionInterceptor {
    delegate: Target,
    interfaces: Vec<String>,
}

impl DelegatingIntroductionInterceptor {
    pub fn new<I, S>(delegate: Target, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            delegate,
            interfaces: interfaces.into_iter().map(Into::into).collect(),
        }
    }
}

impl MethodInterceptor for DelegatingIntroductionInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        if !self.implements_interface(invocation.method().declaring_type()) {
            return invocation.proceed();
        }

        let result = self
            .delegate
            .clone()
            .invoke(invocation.method(), invocation.arguments())?;
        if result.is_same_object(&self.delegate) {
            return Ok(invocation.proxy().clone());
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "DelegatingIntroductionInterceptor"
    }
}

impl IntroductionInterceptor for DelegatingIntroductionInterceptor {
    fn implements_interface(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}
