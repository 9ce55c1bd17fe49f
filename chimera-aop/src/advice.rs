//! 通知（Advice）定义
//!
//! 通知的形态是封闭的：前置、返回后、异常、环绕四种，外加只能通过
//! 注册适配器使用的 [`Advice::Custom`]。除环绕外的形态都由适配器
//! 转换为统一的 [`MethodInterceptor`] 调用约定。

use crate::error_info::ErrorInfo;
use crate::joinpoint::MethodInvocation;
use crate::metadata::Value;
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
}

impl AdviceType {
    /// 是否属于“后置”语义，决定同一切面内的排序规则
    pub fn is_after(self) -> bool {
        matches!(
            self,
            AdviceType::After | AdviceType::AfterReturning | AdviceType::AfterThrowing
        )
    }
}

/// 环绕通知
///
/// 统一的调用约定：通过 `invocation.proceed()` 继续调用链，
/// 不调用则短路，也可以多次调用（重试）
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value>;

    /// 获取通知名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// 前置通知
///
/// 在目标方法执行前调用；返回错误将阻止目标方法执行
pub trait MethodBeforeAdvice: Send + Sync {
    fn before(&self, invocation: &MethodInvocation) -> anyhow::Result<()>;
}

/// 返回后通知
///
/// 只能观察返回值，不能修改
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(&self, return_value: &Value, invocation: &MethodInvocation) -> anyhow::Result<()>;
}

/// 后置通知（无论成功还是失败都执行）
pub trait AfterAdvice: Send + Sync {
    fn after(&self, invocation: &MethodInvocation) -> anyhow::Result<()>;
}

/// 异常处理器的处理结果
#[derive(Debug, Clone)]
pub enum ThrowsOutcome {
    /// 继续抛出原错误
    Rethrow,
    /// 以替代值恢复
    Recover(Value),
}

type TypedHandler = Box<dyn Fn(&(dyn StdError + 'static), &MethodInvocation) -> Option<anyhow::Result<ThrowsOutcome>> + Send + Sync>;
type AnyHandler = Box<dyn Fn(&anyhow::Error, &MethodInvocation) -> anyhow::Result<ThrowsOutcome> + Send + Sync>;

struct ThrowsHandler {
    type_name: &'static str,
    handle: TypedHandler,
}

/// 异常通知
///
/// 按错误类型注册处理器。分派时选择最具体的处理器：
/// 错误本身的类型优先，其次是 `source()` 链上越近的原因，
/// 最后才是 [`ThrowsAdvice::on_any`] 注册的兜底处理器。
pub struct ThrowsAdvice {
    name: String,
    handlers: Vec<ThrowsHandler>,
    fallback: Option<AnyHandler>,
}

impl ThrowsAdvice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
            fallback: None,
        }
    }

    /// 注册某个错误类型的处理器；同一类型重复注册时替换旧处理器
    pub fn on<E, F>(mut self, handler: F) -> Self
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(&E, &MethodInvocation) -> anyhow::Result<ThrowsOutcome> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<E>();
        self.handlers.retain(|h| h.type_name != type_name);
        self.handlers.push(ThrowsHandler {
            type_name,
            handle: Box::new(move |error, invocation| error.downcast_ref::<E>().map(|e| handler(e, invocation))),
        });
        self
    }

    /// 注册兜底处理器，匹配任意错误
    pub fn on_any<F>(mut self, handler: F) -> Self
    where
        F: Fn(&anyhow::Error, &MethodInvocation) -> anyhow::Result<ThrowsOutcome> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len() + usize::from(self.fallback.is_some())
    }

    /// 分派错误到最具体的处理器，没有处理器匹配时返回 `None`
    pub fn handle(&self, error: &anyhow::Error, invocation: &MethodInvocation) -> Option<anyhow::Result<ThrowsOutcome>> {
        for cause in error.chain() {
            for handler in &self.handlers {
                if let Some(outcome) = (handler.handle)(cause, invocation) {
                    tracing::trace!(
                        "Throws advice '{}' handled {} with handler for {}",
                        self.name,
                        ErrorInfo::from_anyhow(error).message,
                        handler.type_name
                    );
                    return Some(outcome);
                }
            }
        }
        self.fallback.as_ref().map(|fallback| fallback(error, invocation))
    }
}

impl fmt::Debug for ThrowsAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrowsAdvice")
            .field("name", &self.name)
            .field("handlers", &self.handlers.iter().map(|h| h.type_name).collect::<Vec<_>>())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

/// 只能由注册的适配器识别的自定义通知
#[derive(Clone)]
pub struct CustomAdvice {
    name: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl CustomAdvice {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, payload: T) -> Self {
        Self {
            name: name.into(),
            payload: Arc::new(payload),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

/// 通知
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn MethodBeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    Throws(Arc<ThrowsAdvice>),
    Around(Arc<dyn MethodInterceptor>),
    Custom(CustomAdvice),
}

impl Advice {
    pub fn before<A: MethodBeforeAdvice + 'static>(advice: A) -> Self {
        Advice::Before(Arc::new(advice))
    }

    pub fn after_returning<A: AfterReturningAdvice + 'static>(advice: A) -> Self {
        Advice::AfterReturning(Arc::new(advice))
    }

    pub fn throws(advice: ThrowsAdvice) -> Self {
        Advice::Throws(Arc::new(advice))
    }

    pub fn around<I: MethodInterceptor + 'static>(interceptor: I) -> Self {
        Advice::Around(Arc::new(interceptor))
    }

    /// 根据形态推断的通知类型
    pub fn advice_type(&self) -> AdviceType {
        match self {
            Advice::Before(_) => AdviceType::Before,
            Advice::AfterReturning(_) => AdviceType::AfterReturning,
            Advice::Throws(_) => AdviceType::AfterThrowing,
            Advice::Around(_) | Advice::Custom(_) => AdviceType::Around,
        }
    }

    /// 用于日志与错误信息的描述
    pub fn describe(&self) -> String {
        match self {
            Advice::Before(_) => "before advice".to_string(),
            Advice::AfterReturning(_) => "after-returning advice".to_string(),
            Advice::Throws(t) => format!("throws advice '{}'", t.name()),
            Advice::Around(i) => format!("interceptor '{}'", i.name()),
            Advice::Custom(c) => format!("custom advice '{}'", c.name()),
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice({})", self.describe())
    }
}

/// 闭包形式的环绕通知
pub struct FnInterceptor<F> {
    name: String,
    func: F,
}

impl<F> MethodInterceptor for FnInterceptor<F>
where
    F: Fn(&mut MethodInvocation) -> anyhow::Result<Value> + Send + Sync,
{
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        (self.func)(invocation)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 用闭包创建环绕通知
pub fn interceptor_fn<F>(name: impl Into<String>, func: F) -> FnInterceptor<F>
where
    F: Fn(&mut MethodInvocation) -> anyhow::Result<Value> + Send + Sync,
{
    FnInterceptor { name: name.into(), func }
}

/// 闭包形式的前置通知
pub struct FnBeforeAdvice<F>(F);

impl<F> MethodBeforeAdvice for FnBeforeAdvice<F>
where
    F: Fn(&MethodInvocation) -> anyhow::Result<()> + Send + Sync,
{
    fn before(&self, invocation: &MethodInvocation) -> anyhow::Result<()> {
        (self.0)(invocation)
    }
}

pub fn before_fn<F>(func: F) -> FnBeforeAdvice<F>
where
    F: Fn(&MethodInvocation) -> anyhow::Result<()> + Send + Sync,
{
    FnBeforeAdvice(func)
}

/// 闭包形式的返回后通知
pub struct FnAfterReturningAdvice<F>(F);

impl<F> AfterReturningAdvice for FnAfterReturningAdvice<F>
where
    F: Fn(&Value, &MethodInvocation) -> anyhow::Result<()> + Send + Sync,
{
    fn after_returning(&self, return_value: &Value, invocation: &MethodInvocation) -> anyhow::Result<()> {
        (self.0)(return_value, invocation)
    }
}

pub fn after_returning_fn<F>(func: F) -> FnAfterReturningAdvice<F>
where
    F: Fn(&Value, &MethodInvocation) -> anyhow::Result<()> + Send + Sync,
{
    FnAfterReturningAdvice(func)
}

/// 闭包形式的后置通知
pub struct FnAfterAdvice<F>(F);

impl<F> AfterAdvice for FnAfterAdvice<F>
where
    F: Fn(&MethodInvocation) -> anyhow::Result<()> + Send + Sync,
{
    fn after(&self, invocation: &MethodInvocation) -> anyhow::Result<()> {
        (self.0)(invocation)
    }
}

pub fn after_fn<F>(func: F) -> FnAfterAdvice<F>
where
    F: Fn(&MethodInvocation) -> anyhow::Result<()> + Send + Sync,
{
    FnAfterAdvice(func)
}
