//! 代理配置（AdvisedSupport）
//!
//! 保存一个代理的目标源、接口、通知器列表，并按 (目标类型, 方法) 缓存
//! 解析好的调用链。通知器列表变化时整体丢弃缓存。

use crate::adapter::{AdvisorAdapterRegistry, RawAdvice};
use crate::advisor::Advisor;
use crate::chain::{AdvisorChainFactory, DefaultAdvisorChainFactory};
use crate::config::ProxyConfig;
use crate::error::{AopError, AopResult};
use crate::joinpoint::InterceptorChain;
use crate::metadata::{ClassRef, MethodSignature};
use crate::target::TargetSource;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 调用链缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodCacheKey {
    target_class: Option<String>,
    method: MethodSignature,
}

impl MethodCacheKey {
    pub fn new(target_class: Option<&str>, method: &MethodSignature) -> Self {
        Self {
            target_class: target_class.map(str::to_string),
            method: method.clone(),
        }
    }
}

/// 代理配置与调用链缓存
pub struct AdvisedSupport {
    config: RwLock<ProxyConfig>,
    target_source: Arc<dyn TargetSource>,
    interfaces: RwLock<Vec<String>>,
    advisors: RwLock<Arc<Vec<Advisor>>>,
    generation: AtomicU64,
    method_cache: RwLock<HashMap<MethodCacheKey, InterceptorChain>>,
    registry: Arc<AdvisorAdapterRegistry>,
    chain_factory: Arc<dyn AdvisorChainFactory>,
}

impl AdvisedSupport {
    pub fn new(target_source: Arc<dyn TargetSource>) -> Self {
        let registry = AdvisorAdapterRegistry::global();
        Self {
            config: RwLock::new(ProxyConfig::default()),
            target_source,
            interfaces: RwLock::new(Vec::new()),
            advisors: RwLock::new(Arc::new(Vec::new())),
            generation: AtomicU64::new(0),
            method_cache: RwLock::new(HashMap::new()),
            chain_factory: Arc::new(DefaultAdvisorChainFactory::with_registry(registry.clone())),
            registry,
        }
    }

    pub fn with_config(self, config: ProxyConfig) -> Self {
        *self.config.write() = config;
        self
    }

    /// 使用指定的适配器注册表（同时替换默认调用链工厂）
    pub fn with_registry(mut self, registry: Arc<AdvisorAdapterRegistry>) -> Self {
        self.chain_factory = Arc::new(DefaultAdvisorChainFactory::with_registry(registry.clone()));
        self.registry = registry;
        self
    }

    pub fn with_chain_factory(mut self, chain_factory: Arc<dyn AdvisorChainFactory>) -> Self {
        self.chain_factory = chain_factory;
        self
    }

    pub fn config(&self) -> ProxyConfig {
        self.config.read().clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.config.read().frozen
    }

    pub fn set_frozen(&self, frozen: bool) {
        self.config.write().frozen = frozen;
    }

    pub fn target_source(&self) -> &Arc<dyn TargetSource> {
        &self.target_source
    }

    pub fn target_class(&self) -> Option<ClassRef> {
        self.target_source.target_class()
    }

    /// 代理需要暴露的用户接口（包括引介接口）
    pub fn interfaces(&self) -> Vec<String> {
        self.interfaces.read().clone()
    }

    pub fn is_interface_proxied(&self, interface: &str) -> bool {
        self.interfaces.read().iter().any(|i| i == interface)
    }

    pub fn add_interface(&self, interface: impl Into<String>) {
        let interface = interface.into();
        let mut interfaces = self.interfaces.write();
        if !interfaces.contains(&interface) {
            interfaces.push(interface);
        }
    }

    /// 当前通知器列表的快照
    pub fn advisors(&self) -> Arc<Vec<Advisor>> {
        self.advisors.read().clone()
    }

    pub fn advisor_count(&self) -> usize {
        self.advisors.read().len()
    }

    pub fn add_advisor(&self, advisor: Advisor) -> AopResult<()> {
        self.ensure_not_frozen("add advisor")?;
        if let Advisor::Introduction(intro) = &advisor {
            intro.validate_interfaces()?;
            for interface in intro.interfaces() {
                self.add_interface(interface.clone());
            }
        }

        let mut advisors = self.advisors.write();
        let mut updated = advisors.as_ref().clone();
        tracing::debug!("Adding advisor {}", advisor.describe());
        updated.push(advisor);
        *advisors = Arc::new(updated);
        self.advice_changed_locked();
        Ok(())
    }

    /// 把通知规整为通知器后添加
    pub fn add_advice(&self, advice: impl Into<RawAdvice>) -> AopResult<()> {
        let advisor = self.registry.wrap(advice)?;
        self.add_advisor(advisor)
    }

    pub fn remove_advisor(&self, index: usize) -> AopResult<Advisor> {
        self.ensure_not_frozen("remove advisor")?;
        let mut advisors = self.advisors.write();
        if index >= advisors.len() {
            return Err(AopError::Config(format!(
                "advisor index {} out of range ({} advisors)",
                index,
                advisors.len()
            )));
        }
        let mut updated = advisors.as_ref().clone();
        let removed = updated.remove(index);
        *advisors = Arc::new(updated);
        self.advice_changed_locked();
        Ok(removed)
    }

    /// 整体替换通知器列表（列表应已排序）
    pub fn replace_advisors(&self, replacement: Vec<Advisor>) -> AopResult<()> {
        self.ensure_not_frozen("replace advisors")?;
        for advisor in &replacement {
            if let Advisor::Introduction(intro) = advisor {
                intro.validate_interfaces()?;
            }
        }
        for advisor in &replacement {
            if let Advisor::Introduction(intro) = advisor {
                for interface in intro.interfaces() {
                    self.add_interface(interface.clone());
                }
            }
        }

        let mut advisors = self.advisors.write();
        tracing::debug!("Replacing {} advisor(s) with {}", advisors.len(), replacement.len());
        *advisors = Arc::new(replacement);
        self.advice_changed_locked();
        Ok(())
    }

    /// 通知器外部变化后调用，丢弃所有缓存的调用链
    pub fn advice_changed(&self) {
        let _advisors = self.advisors.write();
        self.advice_changed_locked();
    }

    // 调用方必须持有 advisors 写锁
    fn advice_changed_locked(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.method_cache.write() = HashMap::new();
    }

    fn ensure_not_frozen(&self, action: &str) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::ConfigFrozen(format!("cannot {}", action)));
        }
        Ok(())
    }

    pub fn cached_chain_count(&self) -> usize {
        self.method_cache.read().len()
    }

    /// 获取方法的拦截器链
    ///
    /// 缓存未命中时在锁外计算；只有没有运行时匹配器、目标源是静态的、
    /// 且计算期间通知器列表没有变化时才写入缓存（已存在则沿用已有条目）
    pub fn interceptors_for(
        &self,
        method: &MethodSignature,
        target_class: Option<&ClassRef>,
    ) -> AopResult<InterceptorChain> {
        let key = MethodCacheKey::new(target_class.map(|c| c.name()), method);
        if let Some(chain) = self.method_cache.read().get(&key) {
            tracing::trace!("Interceptor chain cache hit for {}", method);
            return Ok(chain.clone());
        }

        let (advisors, generation) = {
            let advisors = self.advisors.read();
            (advisors.clone(), self.generation.load(Ordering::SeqCst))
        };
        let resolved = self
            .chain_factory
            .resolve(&advisors, method, target_class.map(|c| c.as_ref()))?;

        if resolved.cacheable && self.target_source.is_static() {
            let _advisors = self.advisors.read();
            if self.generation.load(Ordering::SeqCst) == generation {
                let chain = self
                    .method_cache
                    .write()
                    .entry(key)
                    .or_insert_with(|| resolved.chain.clone())
                    .clone();
                return Ok(chain);
            }
        }
        Ok(resolved.chain)
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisedSupport")
            .field("config", &*self.config.read())
            .field("target_class", &self.target_class().map(|c| c.name().to_string()))
            .field("interfaces", &*self.interfaces.read())
            .field("advisors", &*self.advisors())
            .field("cached_chains", &self.cached_chain_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{before_fn, interceptor_fn, Advice};
    use crate::advisor::IntroductionAdvisor;
    use crate::interceptor::DelegatingIntroductionInterceptor;
    use crate::metadata::{ClassInfo, Invocable, Target, Value};
    use crate::method_matcher::ArgumentsMethodMatcher;
    use crate::pointcut::ComposablePointcut;
    use crate::target::{PrototypeTargetSource, SingletonTargetSource};

    struct Service;

    impl Invocable for Service {
        fn invoke(self: Arc<Self>, _method: &MethodSignature, _args: &[Value]) -> anyhow::Result<Value> {
            Ok(Value::unit())
        }
    }

    fn class() -> ClassRef {
        ClassInfo::new("Service").into_ref()
    }

    fn advised() -> AdvisedSupport {
        let target: Target = Arc::new(Service);
        AdvisedSupport::new(Arc::new(SingletonTargetSource::new(target, class())))
    }

    fn method() -> MethodSignature {
        MethodSignature::new("Service", "run")
    }

    #[test]
    fn test_static_chain_is_cached() {
        let advised = advised();
        advised.add_advice(Advice::before(before_fn(|_| Ok(())))).unwrap();
        let class = class();

        let first = advised.interceptors_for(&method(), Some(&class)).unwrap();
        let second = advised.interceptors_for(&method(), Some(&class)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(advised.cached_chain_count(), 1);
    }

    #[test]
    fn test_advisor_change_invalidates_cache() {
        let advised = advised();
        let class = class();
        let before = advised.interceptors_for(&method(), Some(&class)).unwrap();
        assert!(before.is_empty());

        advised
            .add_advice(Advice::around(interceptor_fn("noop", |inv| inv.proceed())))
            .unwrap();
        assert_eq!(advised.cached_chain_count(), 0);
        assert_eq!(advised.interceptors_for(&method(), Some(&class)).unwrap().len(), 1);

        advised.remove_advisor(0).unwrap();
        assert!(advised.interceptors_for(&method(), Some(&class)).unwrap().is_empty());
    }

    #[test]
    fn test_replacing_advisors_discards_cached_chains() {
        let advised = advised();
        advised.add_advice(Advice::before(before_fn(|_| Ok(())))).unwrap();
        let class = class();
        advised.interceptors_for(&method(), Some(&class)).unwrap();
        assert_eq!(advised.cached_chain_count(), 1);

        let around = Advisor::always(Advice::around(interceptor_fn("noop", |inv| inv.proceed())));
        advised.replace_advisors(vec![around.clone(), around]).unwrap();
        assert_eq!(advised.cached_chain_count(), 0);
        assert_eq!(advised.interceptors_for(&method(), Some(&class)).unwrap().len(), 2);

        advised.set_frozen(true);
        assert!(matches!(advised.replace_advisors(Vec::new()), Err(AopError::ConfigFrozen(_))));
        assert_eq!(advised.advisor_count(), 2);
    }

    #[test]
    fn test_dynamic_chain_is_not_cached() {
        let advised = advised();
        let matcher = ArgumentsMethodMatcher::new(crate::method_matcher::TRUE.clone(), |_, _| true);
        let pointcut = ComposablePointcut::from_method_matcher(Arc::new(matcher));
        advised
            .add_advisor(Advisor::new(Arc::new(pointcut), Advice::before(before_fn(|_| Ok(())))))
            .unwrap();

        advised.interceptors_for(&method(), Some(&class())).unwrap();
        assert_eq!(advised.cached_chain_count(), 0);
    }

    #[test]
    fn test_non_static_target_is_not_cached() {
        let source = PrototypeTargetSource::new(class(), || Ok(Arc::new(Service) as Target));
        let advised = AdvisedSupport::new(Arc::new(source));
        advised.add_advice(Advice::before(before_fn(|_| Ok(())))).unwrap();

        advised.interceptors_for(&method(), Some(&class())).unwrap();
        assert_eq!(advised.cached_chain_count(), 0);
    }

    #[test]
    fn test_frozen_config_rejects_changes() {
        let advised = advised().with_config(ProxyConfig::new().frozen(true));
        let err = advised.add_advice(Advice::before(before_fn(|_| Ok(())))).unwrap_err();
        assert!(matches!(err, AopError::ConfigFrozen(_)));
        assert!(matches!(advised.remove_advisor(0), Err(AopError::ConfigFrozen(_))));

        advised.set_frozen(false);
        assert!(advised.add_advice(Advice::before(before_fn(|_| Ok(())))).is_ok());
    }

    #[test]
    fn test_introduction_adds_interface() {
        let advised = advised();
        let interceptor = DelegatingIntroductionInterceptor::new(Arc::new(Service), ["Lockable"]);
        advised
            .add_advisor(IntroductionAdvisor::new(interceptor, ["Lockable"]).unwrap().into())
            .unwrap();
        assert!(advised.is_interface_proxied("Lockable"));
    }

    #[test]
    fn test_concurrent_first_access_is_consistent() {
        let advised = advised();
        advised.add_advice(Advice::before(before_fn(|_| Ok(())))).unwrap();
        let class = class();

        let chains: Vec<InterceptorChain> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| advised.interceptors_for(&method(), Some(&class)).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(advised.cached_chain_count(), 1);
        let cached = advised.interceptors_for(&method(), Some(&class)).unwrap();
        assert!(chains.iter().all(|c| c.len() == 1));
        assert!(Arc::ptr_eq(&cached, &advised.interceptors_for(&method(), Some(&class)).unwrap()));
    }
}
