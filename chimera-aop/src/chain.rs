//! 调用链解析
//!
//! 根据通知器集合、目标类型和方法计算有序的拦截器链

use crate::adapter::AdvisorAdapterRegistry;
use crate::advisor::Advisor;
use crate::error::AopResult;
use crate::joinpoint::{ChainElement, InterceptorChain};
use crate::metadata::{ClassInfo, MethodSignature};
use crate::method_matcher::{matches_static, MethodMatcher};
use crate::precedence;
use crate::utils::advisors::has_matching_introductions;
use std::sync::Arc;

/// 解析结果
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    pub chain: InterceptorChain,
    /// 链中没有运行时匹配器，可以按 (类型, 方法) 缓存
    pub cacheable: bool,
}

impl ResolvedChain {
    pub fn empty() -> Self {
        Self {
            chain: Vec::new().into(),
            cacheable: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

/// 调用链工厂
pub trait AdvisorChainFactory: Send + Sync {
    /// 计算方法的拦截器链，`target_class` 为空时使用方法的声明类型
    fn resolve(
        &self,
        advisors: &[Advisor],
        method: &MethodSignature,
        target_class: Option<&ClassInfo>,
    ) -> AopResult<ResolvedChain>;
}

/// 默认调用链工厂
pub struct DefaultAdvisorChainFactory {
    registry: Arc<AdvisorAdapterRegistry>,
}

impl DefaultAdvisorChainFactory {
    pub fn new() -> Self {
        Self::with_registry(AdvisorAdapterRegistry::global())
    }

    pub fn with_registry(registry: Arc<AdvisorAdapterRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AdvisorAdapterRegistry> {
        &self.registry
    }
}

impl Default for DefaultAdvisorChainFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorChainFactory for DefaultAdvisorChainFactory {
    fn resolve(
        &self,
        advisors: &[Advisor],
        method: &MethodSignature,
        target_class: Option<&ClassInfo>,
    ) -> AopResult<ResolvedChain> {
        let declaring;
        let class = match target_class {
            Some(class) => class,
            None => {
                declaring = ClassInfo::new(method.declaring_type());
                &declaring
            }
        };

        let has_introductions = has_matching_introductions(advisors, class);
        let mut matched: Vec<(Advisor, Option<Arc<dyn MethodMatcher>>)> = Vec::new();
        let mut cacheable = true;

        for advisor in advisors {
            match advisor {
                Advisor::Pointcut(pa) => {
                    let pointcut = pa.pointcut();
                    if !pointcut.class_filter().matches(class) {
                        continue;
                    }
                    let matcher = pointcut.method_matcher();
                    if !matches_static(matcher.as_ref(), method, Some(class), has_introductions) {
                        continue;
                    }
                    if matcher.is_runtime() {
                        cacheable = false;
                        matched.push((advisor.clone(), Some(matcher)));
                    } else {
                        matched.push((advisor.clone(), None));
                    }
                }
                Advisor::Introduction(intro) => {
                    let introduced = intro.interfaces().iter().any(|i| i == method.declaring_type());
                    if introduced && intro.class_filter().matches(class) {
                        matched.push((advisor.clone(), None));
                    }
                }
            }
        }

        if matched.is_empty() {
            tracing::trace!("No advisors apply to {} on {}", method, class.name());
            return Ok(ResolvedChain::empty());
        }

        let sorted = precedence::sort_by_precedence(matched, |entry| &entry.0);
        let mut chain = Vec::with_capacity(sorted.len());
        for (advisor, runtime_matcher) in sorted {
            for interceptor in self.registry.get_interceptors(&advisor)? {
                chain.push(match &runtime_matcher {
                    Some(matcher) => ChainElement::Dynamic {
                        interceptor,
                        matcher: matcher.clone(),
                    },
                    None => ChainElement::Interceptor(interceptor),
                });
            }
        }

        tracing::debug!(
            "Resolved {} interceptor(s) for {} on {} (cacheable: {})",
            chain.len(),
            method,
            class.name(),
            cacheable
        );
        Ok(ResolvedChain {
            chain: chain.into(),
            cacheable,
        })
    }
}
