//! 代理构建
//!
//! [`DefaultAopProxyFactory`] 只做决策：代理前端基于接口还是基于子类、
//! 需要暴露哪些接口。真正生成前端对象交给 [`ProxyGenerator`]；
//! [`HandleProxyGenerator`] 是进程内的实现，生成按方法签名分派的 [`ProxyHandle`]。

use crate::adapter::RawAdvice;
use crate::advised::AdvisedSupport;
use crate::advisor::Advisor;
use crate::config::ProxyConfig;
use crate::error::{AopError, AopResult};
use crate::joinpoint::MethodInvocation;
use crate::metadata::{ClassRef, Invocable, MethodSignature, Target, Value};
use crate::target::{SingletonTargetSource, TargetGuard, TargetSource};
use std::fmt;
use std::sync::Arc;

/// 代理管理接口，非 opaque 的代理都会暴露
pub const ADVISED_INTERFACE: &str = "chimera_aop::Advised";

/// 代理构建方案
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyPlan {
    /// 前端实现给定的接口集合
    Interface { interfaces: Vec<String> },
    /// 前端继承具体的目标类型
    Subclass {
        superclass: ClassRef,
        interfaces: Vec<String>,
    },
}

impl ProxyPlan {
    pub fn interfaces(&self) -> &[String] {
        match self {
            ProxyPlan::Interface { interfaces } => interfaces,
            ProxyPlan::Subclass { interfaces, .. } => interfaces,
        }
    }

    pub fn is_subclass(&self) -> bool {
        matches!(self, ProxyPlan::Subclass { .. })
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        match self {
            ProxyPlan::Interface { .. } => None,
            ProxyPlan::Subclass { superclass, .. } => Some(superclass),
        }
    }

    /// 前端是否暴露该方法
    pub fn exposes(&self, method: &MethodSignature) -> bool {
        let declaring = method.declaring_type();
        if self.interfaces().iter().any(|i| i == declaring) {
            return true;
        }
        match self {
            ProxyPlan::Interface { .. } => false,
            ProxyPlan::Subclass { superclass, .. } => superclass.is_assignable_to(declaring),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ProxyPlan::Interface { interfaces } => format!("interface proxy [{}]", interfaces.join(", ")),
            ProxyPlan::Subclass { superclass, interfaces } => {
                format!("subclass proxy of {} [{}]", superclass.name(), interfaces.join(", "))
            }
        }
    }
}

impl fmt::Display for ProxyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// 代理前端的统一分派入口
pub trait InvocationHandler: Send + Sync {
    fn invoke(&self, proxy: &Value, method: &MethodSignature, args: Vec<Value>) -> anyhow::Result<Value>;

    /// 代理背后的配置（用于 `Advised` 管理接口）
    fn advised(&self) -> Option<Arc<AdvisedSupport>> {
        None
    }
}

/// 代理前端生成器
///
/// 接收构建方案和分派入口，返回新的前端对象
pub trait ProxyGenerator: Send + Sync {
    fn generate(&self, plan: &ProxyPlan, handler: Arc<dyn InvocationHandler>) -> AopResult<Value>;
}

/// 默认的代理构建决策
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAopProxyFactory;

impl DefaultAopProxyFactory {
    /// 决定代理的构建方案
    ///
    /// `optimize`、`proxy_target_class` 或没有用户接口时使用子类代理；
    /// 目标本身是接口或已是代理类型时仍然基于接口。
    pub fn decide(&self, advised: &AdvisedSupport) -> AopResult<ProxyPlan> {
        let config = advised.config();
        let mut interfaces = advised.interfaces();
        let target_class = advised.target_class();
        let use_subclass = config.optimize || config.proxy_target_class || interfaces.is_empty();

        let plan = if use_subclass {
            let class = target_class.clone().ok_or_else(|| {
                AopError::ProxyCreation(
                    "target source cannot determine target class: an interface or a target class is required"
                        .to_string(),
                )
            })?;

            if class.is_interface() || class.is_proxy_class() {
                let inherited = if class.is_interface() {
                    vec![class.name().to_string()]
                } else {
                    class.all_interfaces()
                };
                for interface in inherited {
                    if !interfaces.contains(&interface) {
                        interfaces.push(interface);
                    }
                }
                ProxyPlan::Interface { interfaces }
            } else {
                if class.is_final() {
                    return Err(AopError::ProxyCreation(format!(
                        "cannot subclass final class {}",
                        class.name()
                    )));
                }
                ProxyPlan::Subclass {
                    superclass: class,
                    interfaces,
                }
            }
        } else {
            if let Some(class) = &target_class {
                Self::check_interfaces(class, &interfaces, &advised.advisors())?;
            }
            ProxyPlan::Interface { interfaces }
        };

        let plan = Self::complete_interfaces(plan, &config)?;
        tracing::debug!(
            "Proxy decision for {}: {}",
            target_class.as_ref().map(|c| c.name()).unwrap_or("<unknown>"),
            plan
        );
        Ok(plan)
    }

    // 每个用户接口必须由目标实现或由引介提供
    fn check_interfaces(class: &ClassRef, interfaces: &[String], advisors: &[Advisor]) -> AopResult<()> {
        for interface in interfaces {
            let introduced = advisors.iter().any(|a| match a {
                Advisor::Introduction(intro) => intro.interfaces().contains(interface),
                Advisor::Pointcut(_) => false,
            });
            if !introduced && !class.is_assignable_to(interface) {
                return Err(AopError::ProxyCreation(format!(
                    "{} does not implement {} and no introduction provides it",
                    class.name(),
                    interface
                )));
            }
        }
        Ok(())
    }

    fn complete_interfaces(plan: ProxyPlan, config: &ProxyConfig) -> AopResult<ProxyPlan> {
        let add_advised = |mut interfaces: Vec<String>| {
            if !config.opaque && !interfaces.iter().any(|i| i == ADVISED_INTERFACE) {
                interfaces.push(ADVISED_INTERFACE.to_string());
            }
            interfaces
        };
        match plan {
            ProxyPlan::Interface { interfaces } => {
                if interfaces.is_empty() {
                    return Err(AopError::ProxyCreation("interface proxy requires at least one interface".to_string()));
                }
                Ok(ProxyPlan::Interface {
                    interfaces: add_advised(interfaces),
                })
            }
            ProxyPlan::Subclass { superclass, interfaces } => Ok(ProxyPlan::Subclass {
                superclass,
                interfaces: add_advised(interfaces),
            }),
        }
    }
}

/// 拦截调用的分派入口
///
/// 每次调用：从目标源获取目标 → 取得调用链 → 执行 → 归还目标
pub struct AopProxy {
    advised: Arc<AdvisedSupport>,
}

impl AopProxy {
    pub fn new(advised: Arc<AdvisedSupport>) -> Self {
        Self { advised }
    }
}

impl InvocationHandler for AopProxy {
    fn invoke(&self, proxy: &Value, method: &MethodSignature, args: Vec<Value>) -> anyhow::Result<Value> {
        let source = self.advised.target_source().clone();
        let guard = TargetGuard::acquire(source.as_ref())?;
        let target = guard.target().cloned();
        let target_class = source.target_class();
        let chain = self.advised.interceptors_for(method, target_class.as_ref())?;

        let result = if chain.is_empty() {
            match &target {
                Some(target) => target.clone().invoke(method, &args)?,
                None => return Err(AopError::NoTarget(method.to_string()).into()),
            }
        } else {
            let mut invocation =
                MethodInvocation::new(proxy.clone(), target.clone(), target_class, method.clone(), args, chain);
            invocation.proceed()?
        };

        match &target {
            Some(target) if result.is_same_object(target) => Ok(proxy.clone()),
            _ => Ok(result),
        }
    }

    fn advised(&self) -> Option<Arc<AdvisedSupport>> {
        Some(self.advised.clone())
    }
}

/// 进程内的代理前端
pub struct ProxyHandle {
    plan: ProxyPlan,
    handler: Arc<dyn InvocationHandler>,
}

impl ProxyHandle {
    /// 通过代理调用方法
    pub fn call(self: &Arc<Self>, method: &MethodSignature, args: Vec<Value>) -> anyhow::Result<Value> {
        if !self.plan.exposes(method) {
            return Err(AopError::MethodNotExposed {
                method: method.to_string(),
                plan: self.plan.describe(),
            }
            .into());
        }
        let proxy = Value::from_arc(self.clone());
        self.handler.invoke(&proxy, method, args)
    }

    pub fn plan(&self) -> &ProxyPlan {
        &self.plan
    }

    /// 代理配置；opaque 代理返回 `None`
    pub fn advised(&self) -> Option<Arc<AdvisedSupport>> {
        if self.plan.interfaces().iter().any(|i| i == ADVISED_INTERFACE) {
            self.handler.advised()
        } else {
            None
        }
    }
}

impl Invocable for ProxyHandle {
    fn invoke(self: Arc<Self>, method: &MethodSignature, args: &[Value]) -> anyhow::Result<Value> {
        self.call(method, args.to_vec())
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle").field("plan", &self.plan.describe()).finish()
    }
}

/// 生成 [`ProxyHandle`] 的代理生成器
#[derive(Debug, Default, Clone, Copy)]
pub struct HandleProxyGenerator;

impl ProxyGenerator for HandleProxyGenerator {
    fn generate(&self, plan: &ProxyPlan, handler: Arc<dyn InvocationHandler>) -> AopResult<Value> {
        Ok(Value::from_arc(Arc::new(ProxyHandle {
            plan: plan.clone(),
            handler,
        })))
    }
}

/// 代理工厂
pub struct ProxyFactory {
    advised: AdvisedSupport,
}

impl ProxyFactory {
    /// 为单例目标创建代理工厂
    pub fn new(target: Target, target_class: ClassRef) -> Self {
        Self::with_target_source(Arc::new(SingletonTargetSource::new(target, target_class)))
    }

    pub fn with_target_source(target_source: Arc<dyn TargetSource>) -> Self {
        Self {
            advised: AdvisedSupport::new(target_source),
        }
    }

    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.advised = self.advised.with_config(config);
        self
    }

    /// 添加需要代理的接口
    pub fn interface(self, interface: impl Into<String>) -> Self {
        self.advised.add_interface(interface);
        self
    }

    pub fn add_advisor(&self, advisor: Advisor) -> AopResult<()> {
        self.advised.add_advisor(advisor)
    }

    pub fn add_advice(&self, advice: impl Into<RawAdvice>) -> AopResult<()> {
        self.advised.add_advice(advice)
    }

    pub fn advised(&self) -> &AdvisedSupport {
        &self.advised
    }

    /// 当前配置下的构建方案
    pub fn plan(&self) -> AopResult<ProxyPlan> {
        DefaultAopProxyFactory.decide(&self.advised)
    }

    /// 生成代理前端
    pub fn get_proxy(self, generator: &dyn ProxyGenerator) -> AopResult<Value> {
        let plan = self.plan()?;
        let handler = Arc::new(AopProxy::new(Arc::new(self.advised)));
        generator.generate(&plan, handler)
    }

    /// 使用进程内生成器生成代理
    pub fn get_handle(self) -> AopResult<Arc<ProxyHandle>> {
        self.get_proxy(&HandleProxyGenerator)?
            .downcast_arc::<ProxyHandle>()
            .ok_or_else(|| AopError::ProxyCreation("generator did not return a ProxyHandle".to_string()))
    }
}
