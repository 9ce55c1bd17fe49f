//! 自动代理
//!
//! 在 Bean 初始化后调用 [`AutoProxyCreator::wrap_if_necessary`]：
//! 从通知器来源取得候选通知器，筛选出能作用于该 Bean 类型的部分，
//! 排序后构建代理；没有适用的通知器时原样返回 Bean。
//!
//! 当前 Bean 的名称通过 [`ProxyCreationContext`] 显式传入，不依赖线程局部状态。
//!
//! 代理创建后仍跟随通知器来源：每次调用前比较 [`AdvisorSource::version`]，
//! 版本变化时重新筛选通知器并替换到代理配置中。代理方案（接口或子类）
//! 在创建时确定，之后不再变化；创建时未被代理的 Bean 也不会事后被代理。

use crate::adapter::AdvisorAdapterRegistry;
use crate::advised::AdvisedSupport;
use crate::advisor::Advisor;
use crate::config::{AopProperties, ProxyConfig};
use crate::error::AopResult;
use crate::metadata::{ClassRef, MethodSignature, Target, Value};
use crate::precedence;
use crate::proxy::{AopProxy, DefaultAopProxyFactory, HandleProxyGenerator, InvocationHandler, ProxyGenerator, ProxyHandle};
use crate::target::SingletonTargetSource;
use crate::utils::advisors::find_advisors_that_can_apply;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 代理创建上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCreationContext {
    bean_name: String,
}

impl ProxyCreationContext {
    pub fn new(bean_name: impl Into<String>) -> Self {
        Self {
            bean_name: bean_name.into(),
        }
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }
}

/// 通知器来源
///
/// 每次创建代理时重新查询，结果视为不透明的候选集合
pub trait AdvisorSource: Send + Sync {
    fn candidate_advisors(&self, context: &ProxyCreationContext) -> Vec<Advisor>;

    /// 候选集合的版本，集合变化时递增
    ///
    /// 已创建的代理在版本变化后的下一次调用时重新查询候选集合；
    /// 固定不变的来源保持默认实现即可
    fn version(&self) -> u64 {
        0
    }
}

impl AdvisorSource for Vec<Advisor> {
    fn candidate_advisors(&self, _context: &ProxyCreationContext) -> Vec<Advisor> {
        self.clone()
    }
}

/// 后处理结果
#[derive(Clone)]
pub enum ProcessedBean {
    /// 没有适用的通知器，原样返回
    Raw(Target),
    /// 代理前端
    Proxied(Value),
}

impl ProcessedBean {
    pub fn is_proxied(&self) -> bool {
        matches!(self, ProcessedBean::Proxied(_))
    }

    /// 由 [`HandleProxyGenerator`] 生成的代理前端
    pub fn as_handle(&self) -> Option<Arc<ProxyHandle>> {
        match self {
            ProcessedBean::Proxied(value) => value.downcast_arc::<ProxyHandle>(),
            ProcessedBean::Raw(_) => None,
        }
    }

    /// 转换为可调用的目标（原始 Bean 或代理句柄）
    pub fn into_target(self) -> Option<Target> {
        match self {
            ProcessedBean::Raw(target) => Some(target),
            ProcessedBean::Proxied(value) => value.downcast_arc::<ProxyHandle>().map(|handle| handle as Target),
        }
    }
}

impl fmt::Debug for ProcessedBean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessedBean::Raw(_) => f.write_str("ProcessedBean::Raw"),
            ProcessedBean::Proxied(value) => write!(f, "ProcessedBean::Proxied({:?})", value),
        }
    }
}

/// 自动代理创建器
pub struct AutoProxyCreator {
    source: Arc<dyn AdvisorSource>,
    config: ProxyConfig,
    enabled: bool,
    registry: Arc<AdvisorAdapterRegistry>,
    generator: Arc<dyn ProxyGenerator>,
}

impl AutoProxyCreator {
    pub fn new(source: Arc<dyn AdvisorSource>) -> Self {
        Self {
            source,
            config: ProxyConfig::default(),
            enabled: true,
            registry: AdvisorAdapterRegistry::global(),
            generator: Arc::new(HandleProxyGenerator),
        }
    }

    pub fn from_properties(source: Arc<dyn AdvisorSource>, properties: &AopProperties) -> Self {
        let mut creator = Self::new(source).config(properties.proxy.clone());
        creator.enabled = properties.enabled;
        creator
    }

    /// 创建禁用的自动代理创建器
    pub fn disabled(source: Arc<dyn AdvisorSource>) -> Self {
        let mut creator = Self::new(source);
        creator.enabled = false;
        creator
    }

    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<AdvisorAdapterRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ProxyGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 能作用于该 Bean 的通知器（已排序）
    pub fn eligible_advisors(&self, bean_name: &str, bean_class: &ClassRef) -> Vec<Advisor> {
        eligible_advisors(self.source.as_ref(), bean_name, bean_class)
    }

    /// 必要时为 Bean 创建代理
    pub fn wrap_if_necessary(&self, bean: Target, bean_name: &str, bean_class: ClassRef) -> AopResult<ProcessedBean> {
        if !self.enabled {
            return Ok(ProcessedBean::Raw(bean));
        }
        if bean_class.is_proxy_class() {
            tracing::trace!("Bean '{}' is already a proxy, skipping", bean_name);
            return Ok(ProcessedBean::Raw(bean));
        }

        let version = self.source.version();
        let advisors = self.eligible_advisors(bean_name, &bean_class);
        if advisors.is_empty() {
            tracing::trace!("Bean '{}' does not match any advisor, skipping AOP wrapping", bean_name);
            return Ok(ProcessedBean::Raw(bean));
        }

        let frozen = self.config.frozen;
        let advised = AdvisedSupport::new(Arc::new(SingletonTargetSource::new(bean, bean_class.clone())))
            .with_registry(self.registry.clone())
            .with_config(self.config.clone().frozen(false));
        if !self.config.proxy_target_class {
            for interface in bean_class.all_interfaces() {
                advised.add_interface(interface);
            }
        }
        let count = advisors.len();
        for advisor in advisors {
            advised.add_advisor(advisor)?;
        }
        advised.set_frozen(frozen);

        let advised = Arc::new(advised);
        let plan = DefaultAopProxyFactory.decide(&advised)?;
        let handler = Arc::new(RefreshingProxy {
            source: self.source.clone(),
            bean_name: bean_name.to_string(),
            bean_class,
            seen_version: AtomicU64::new(version),
            refresh: Mutex::new(()),
            inner: AopProxy::new(advised.clone()),
            advised,
        });
        let proxy = self.generator.generate(&plan, handler)?;
        tracing::info!("Created AOP proxy for bean '{}' with {} advisor(s)", bean_name, count);
        Ok(ProcessedBean::Proxied(proxy))
    }
}

fn eligible_advisors(source: &dyn AdvisorSource, bean_name: &str, bean_class: &ClassRef) -> Vec<Advisor> {
    let context = ProxyCreationContext::new(bean_name);
    let candidates = source.candidate_advisors(&context);
    let eligible = find_advisors_that_can_apply(&candidates, bean_class);
    precedence::sort_advisors(eligible)
}

/// 跟随通知器来源刷新的调用处理器
struct RefreshingProxy {
    source: Arc<dyn AdvisorSource>,
    bean_name: String,
    bean_class: ClassRef,
    seen_version: AtomicU64,
    refresh: Mutex<()>,
    inner: AopProxy,
    advised: Arc<AdvisedSupport>,
}

impl RefreshingProxy {
    fn refresh_if_changed(&self) {
        if self.source.version() == self.seen_version.load(Ordering::Acquire) {
            return;
        }
        let _guard = self.refresh.lock();
        let version = self.source.version();
        if version == self.seen_version.load(Ordering::Acquire) {
            return;
        }
        if self.advised.is_frozen() {
            tracing::trace!("Proxy for bean '{}' is frozen, ignoring advisor changes", self.bean_name);
            self.seen_version.store(version, Ordering::Release);
            return;
        }

        let advisors = eligible_advisors(self.source.as_ref(), &self.bean_name, &self.bean_class);
        let count = advisors.len();
        match self.advised.replace_advisors(advisors) {
            Ok(()) => tracing::debug!(
                "Advisor source changed (version {}), bean '{}' now has {} advisor(s)",
                version,
                self.bean_name,
                count
            ),
            Err(e) => tracing::warn!("Failed to refresh advisors for bean '{}': {}", self.bean_name, e),
        }
        self.seen_version.store(version, Ordering::Release);
    }
}

impl InvocationHandler for RefreshingProxy {
    fn invoke(&self, proxy: &Value, method: &MethodSignature, args: Vec<Value>) -> anyhow::Result<Value> {
        self.refresh_if_changed();
        self.inner.invoke(proxy, method, args)
    }

    fn advised(&self) -> Option<Arc<AdvisedSupport>> {
        self.inner.advised()
    }
}
