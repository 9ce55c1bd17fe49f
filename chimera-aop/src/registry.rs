//! 切面注册表
//!
//! 通知器的来源：保存已注册的切面定义和独立的通知器，
//! 按 Bean 上下文给出候选通知器。每次变更都会递增版本号。

use crate::advisor::Advisor;
use crate::aspect::AspectDefinition;
use crate::auto_proxy::{AdvisorSource, ProxyCreationContext};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 全局切面注册表
///
/// 首次访问时初始化，加载所有通过 inventory 注册的切面
static GLOBAL_ASPECT_REGISTRY: Lazy<Arc<AspectRegistry>> = Lazy::new(|| {
    let registry = AspectRegistry::new();
    registry.auto_load_aspects();
    Arc::new(registry)
});

/// 获取全局切面注册表
pub fn get_global_registry() -> &'static Arc<AspectRegistry> {
    &GLOBAL_ASPECT_REGISTRY
}

/// 切面注册表
pub struct AspectRegistry {
    aspects: RwLock<Vec<AspectDefinition>>,
    advisors: RwLock<Vec<Advisor>>,
    version: AtomicU64,
}

impl AspectRegistry {
    pub fn new() -> Self {
        Self {
            aspects: RwLock::new(Vec::new()),
            advisors: RwLock::new(Vec::new()),
            version: AtomicU64::new(0),
        }
    }

    /// 注册切面；同名切面会被替换
    pub fn register(&self, aspect: AspectDefinition) {
        tracing::debug!("Registering aspect: {}", aspect.name());
        let mut aspects = self.aspects.write();
        aspects.retain(|a| a.name() != aspect.name());
        aspects.push(aspect);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// 注册不属于任何切面的通知器
    pub fn register_advisor(&self, advisor: Advisor) {
        tracing::debug!("Registering advisor: {}", advisor.describe());
        self.advisors.write().push(advisor);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// 移除切面
    pub fn remove(&self, name: &str) -> bool {
        let mut aspects = self.aspects.write();
        let before = aspects.len();
        aspects.retain(|a| a.name() != name);
        let removed = aspects.len() != before;
        if removed {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    pub fn aspect_names(&self) -> Vec<String> {
        self.aspects.read().iter().map(|a| a.name().to_string()).collect()
    }

    /// 已注册的切面数量
    pub fn len(&self) -> usize {
        self.aspects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.aspects.read().is_empty() && self.advisors.read().is_empty()
    }

    /// 清除所有切面和通知器
    pub fn clear(&self) {
        self.aspects.write().clear();
        self.advisors.write().clear();
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// 从 inventory 自动加载所有注册的切面，返回加载数量
    pub fn auto_load_aspects(&self) -> usize {
        let registrations: Vec<_> = crate::aspect::get_all_aspect_registrations().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        for registration in &registrations {
            let definition = registration.create_definition();
            tracing::debug!(
                "  ├─ Loading aspect: {} with {} advisor(s)",
                registration.name,
                definition.advisors().len()
            );
            self.register(definition);
        }

        registrations.len()
    }
}

impl Default for AspectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorSource for AspectRegistry {
    fn candidate_advisors(&self, context: &ProxyCreationContext) -> Vec<Advisor> {
        let mut candidates: Vec<Advisor> = self
            .aspects
            .read()
            .iter()
            .filter(|aspect| aspect.matches_bean(context.bean_name()))
            .flat_map(|aspect| aspect.advisors())
            .collect();
        candidates.extend(self.advisors.read().iter().cloned());
        candidates
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}
