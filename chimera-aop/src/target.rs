//! 目标源（TargetSource）
//!
//! 代理不直接持有目标对象，而是每次调用时从目标源获取，调用结束后归还。
//! 这使得单例、原型、对象池、热替换、延迟初始化都可以放在同一个代理之后。

use crate::metadata::{ClassRef, Target};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 目标源
pub trait TargetSource: Send + Sync {
    /// 目标的类型，未知时返回 `None`
    fn target_class(&self) -> Option<ClassRef>;

    /// 是否每次都返回同一个实例，决定调用链能否缓存
    fn is_static(&self) -> bool;

    /// 获取本次调用的目标
    fn get_target(&self) -> anyhow::Result<Option<Target>>;

    /// 归还目标
    fn release_target(&self, _target: Target) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 目标获取守卫
///
/// 获取成功后，无论调用正常返回还是出错，离开作用域时都会恰好归还一次
pub struct TargetGuard<'a> {
    source: &'a dyn TargetSource,
    target: Option<Target>,
}

impl<'a> TargetGuard<'a> {
    pub fn acquire(source: &'a dyn TargetSource) -> anyhow::Result<Self> {
        let target = source.get_target()?;
        Ok(Self { source, target })
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }
}

impl<'a> Drop for TargetGuard<'a> {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            if let Err(e) = self.source.release_target(target) {
                tracing::error!("Failed to release target: {}", e);
            }
        }
    }
}

/// 单例目标源：始终返回同一个目标
pub struct SingletonTargetSource {
    target: Target,
    target_class: Option<ClassRef>,
}

impl SingletonTargetSource {
    pub fn new(target: Target, target_class: ClassRef) -> Self {
        Self {
            target,
            target_class: Some(target_class),
        }
    }

    /// 类型未知的目标
    pub fn untyped(target: Target) -> Self {
        Self {
            target,
            target_class: None,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> Option<ClassRef> {
        self.target_class.clone()
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Option<Target>> {
        Ok(Some(self.target.clone()))
    }
}

impl fmt::Debug for SingletonTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonTargetSource")
            .field("target_class", &self.target_class.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

/// 空目标源：没有目标，只能用于所有方法都由通知处理的代理
#[derive(Debug, Default)]
pub struct EmptyTargetSource {
    target_class: Option<ClassRef>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_class(target_class: ClassRef) -> Self {
        Self {
            target_class: Some(target_class),
        }
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_class(&self) -> Option<ClassRef> {
        self.target_class.clone()
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Option<Target>> {
        Ok(None)
    }
}

type TargetFactory = dyn Fn() -> anyhow::Result<Target> + Send + Sync;

/// 原型目标源：每次调用创建新目标
pub struct PrototypeTargetSource {
    target_class: ClassRef,
    factory: Box<TargetFactory>,
}

impl PrototypeTargetSource {
    pub fn new<F>(target_class: ClassRef, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Target> + Send + Sync + 'static,
    {
        Self {
            target_class,
            factory: Box::new(factory),
        }
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_class(&self) -> Option<ClassRef> {
        Some(self.target_class.clone())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Target>> {
        tracing::trace!("Creating prototype target of {}", self.target_class.name());
        (self.factory)().map(Some)
    }
}

/// 可热替换的目标源
pub struct HotSwappableTargetSource {
    target_class: ClassRef,
    target: RwLock<Target>,
}

impl HotSwappableTargetSource {
    pub fn new(target: Target, target_class: ClassRef) -> Self {
        Self {
            target_class,
            target: RwLock::new(target),
        }
    }

    /// 替换目标，返回旧目标；已经开始的调用继续使用旧目标
    pub fn swap(&self, new_target: Target) -> Target {
        tracing::debug!("Swapping target of {}", self.target_class.name());
        std::mem::replace(&mut *self.target.write(), new_target)
    }
}

impl TargetSource for HotSwappableTargetSource {
    fn target_class(&self) -> Option<ClassRef> {
        Some(self.target_class.clone())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Target>> {
        Ok(Some(self.target.read().clone()))
    }
}

/// 延迟初始化目标源：第一次调用时才创建目标
pub struct LazyInitTargetSource {
    target_class: ClassRef,
    factory: Box<TargetFactory>,
    target: OnceCell<Target>,
}

impl LazyInitTargetSource {
    pub fn new<F>(target_class: ClassRef, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Target> + Send + Sync + 'static,
    {
        Self {
            target_class,
            factory: Box::new(factory),
            target: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.target.get().is_some()
    }
}

impl TargetSource for LazyInitTargetSource {
    fn target_class(&self) -> Option<ClassRef> {
        Some(self.target_class.clone())
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Option<Target>> {
        let target = self.target.get_or_try_init(|| {
            tracing::debug!("Lazily initializing target of {}", self.target_class.name());
            (self.factory)()
        })?;
        Ok(Some(target.clone()))
    }
}

/// 对象池目标源
///
/// 池中的目标同一时间只借给一个调用；池满且没有空闲目标时获取失败
pub struct PoolingTargetSource {
    target_class: ClassRef,
    factory: Box<TargetFactory>,
    max_size: usize,
    idle: Mutex<Vec<Target>>,
    created: AtomicUsize,
    active: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl PoolingTargetSource {
    pub fn new<F>(target_class: ClassRef, max_size: usize, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Target> + Send + Sync + 'static,
    {
        Self {
            target_class,
            factory: Box::new(factory),
            max_size: max_size.max(1),
            idle: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl TargetSource for PoolingTargetSource {
    fn target_class(&self) -> Option<ClassRef> {
        Some(self.target_class.clone())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Target>> {
        let mut idle = self.idle.lock();
        let target = match idle.pop() {
            Some(target) => target,
            None => {
                if self.created.load(Ordering::SeqCst) >= self.max_size {
                    anyhow::bail!(
                        "Target pool for {} exhausted (max size {})",
                        self.target_class.name(),
                        self.max_size
                    );
                }
                let target = (self.factory)()?;
                self.created.fetch_add(1, Ordering::SeqCst);
                target
            }
        };
        drop(idle);

        self.active.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Some(target))
    }

    fn release_target(&self, target: Target) -> anyhow::Result<()> {
        self.idle.lock().push(target);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
