//! Chimera AOP - 面向切面编程支持
//!
//! 运行时方法拦截子系统，提供：
//! - 类型过滤器、方法匹配器与可组合的切点（含切点表达式）
//! - 多种通知类型（Before、AfterReturning、AfterThrowing、After、Around）与引介
//! - 通知器适配器注册表，把通知统一转换为拦截器
//! - 拦截器调用链、调用链解析与按方法缓存
//! - 切面优先级排序（偏序 + 稳定回退）
//! - 目标对象来源（单例、原型、热替换、延迟初始化、对象池）
//! - 代理方案决策与代理前端
//! - 通过 inventory 收集切面并自动创建代理

pub mod adapter;
pub mod advice;
pub mod advised;
pub mod advisor;
pub mod aspect;
pub mod auto_proxy;
pub mod chain;
pub mod class_filter;
pub mod config;
pub mod error;
pub mod error_info;
pub mod interceptor;
pub mod joinpoint;
pub mod metadata;
pub mod method_matcher;
pub mod pointcut;
pub mod precedence;
pub mod proxy;
pub mod registry;
pub mod target;
pub mod utils;

// 重新导出核心类型
pub use adapter::{AdvisorAdapter, AdvisorAdapterRegistry, RawAdvice};
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, CustomAdvice, MethodBeforeAdvice,
    MethodInterceptor, ThrowsAdvice, ThrowsOutcome,
};
pub use advised::{AdvisedSupport, MethodCacheKey};
pub use advisor::{
    Advisor, AspectMetadata, IntroductionAdvisor, IntroductionInterceptor, Ordered, PointcutAdvisor,
};
pub use aspect::{AspectDefinition, AspectRegistration};
pub use auto_proxy::{AdvisorSource, AutoProxyCreator, ProcessedBean, ProxyCreationContext};
pub use chain::{AdvisorChainFactory, DefaultAdvisorChainFactory, ResolvedChain};
pub use class_filter::{ClassFilter, ClassFilters};
pub use config::{AopProperties, ProxyConfig};
pub use error::{AopError, AopResult};
pub use error_info::ErrorInfo;
pub use joinpoint::{ChainElement, InterceptorChain, MethodInvocation};
pub use metadata::{ClassInfo, ClassRef, Invocable, MethodSignature, Target, Value};
pub use method_matcher::{IntroductionAwareMethodMatcher, MethodMatcher, MethodMatchers};
pub use pointcut::{ComposablePointcut, Pointcut, PointcutExpression};
pub use proxy::{
    AopProxy, DefaultAopProxyFactory, HandleProxyGenerator, InvocationHandler, ProxyFactory,
    ProxyGenerator, ProxyHandle, ProxyPlan,
};
pub use registry::{get_global_registry, AspectRegistry};
pub use target::{
    EmptyTargetSource, HotSwappableTargetSource, LazyInitTargetSource, PoolingTargetSource,
    PrototypeTargetSource, SingletonTargetSource, TargetSource,
};

// 导出 inventory 供切面注册使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{
        after_fn, after_returning_fn, before_fn, interceptor_fn, Advice, AdviceType, MethodInterceptor,
        ThrowsAdvice, ThrowsOutcome,
    };
    pub use crate::advisor::{Advisor, IntroductionAdvisor};
    pub use crate::aspect::{AspectDefinition, AspectRegistration};
    pub use crate::auto_proxy::AutoProxyCreator;
    pub use crate::config::{AopProperties, ProxyConfig};
    pub use crate::error::{AopError, AopResult};
    pub use crate::joinpoint::MethodInvocation;
    pub use crate::metadata::{ClassInfo, Invocable, MethodSignature, Target, Value};
    pub use crate::pointcut::{Pointcut, PointcutExpression};
    pub use crate::proxy::{ProxyFactory, ProxyHandle};
    pub use crate::registry::{get_global_registry, AspectRegistry};
}
