//! 拦截子系统的错误类型
//!
//! 配置期错误使用 [`AopError`]；单次调用中目标方法或通知抛出的错误统一使用
//! `anyhow::Error` 透传，不做包装。

use thiserror::Error;

/// AOP 配置期与契约错误
#[derive(Debug, Error)]
pub enum AopError {
    /// 没有任何适配器能够处理该通知
    #[error("Unknown advice type: {0}")]
    UnknownAdviceType(String),

    /// 引介（Introduction）声明的接口无法满足
    #[error("Introduction conflict: {0}")]
    IntroductionConflict(String),

    /// 无法为给定配置构造代理前端
    #[error("Cannot create proxy: {0}")]
    ProxyCreation(String),

    /// 代理配置已冻结，不允许再修改通知
    #[error("Proxy configuration is frozen: {0}")]
    ConfigFrozen(String),

    /// 配置解析失败
    #[error("Invalid AOP configuration: {0}")]
    Config(String),

    /// 对已完成的调用再次调用 proceed()
    #[error("proceed() called on an already completed invocation of {0}")]
    InvocationCompleted(String),

    /// 目标源没有提供目标对象，但调用链需要执行目标方法
    #[error("No target available to invoke {0}")]
    NoTarget(String),

    /// 代理前端没有暴露该方法
    #[error("Method {method} is not exposed by proxy ({plan})")]
    MethodNotExposed { method: String, plan: String },
}

/// 配置期操作的结果类型
pub type AopResult<T> = Result<T, AopError>;
