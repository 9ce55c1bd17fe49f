//! 连接点（JoinPoint）
//!
//! [`MethodInvocation`] 是一次被拦截的方法调用：它持有代理前端、真实目标、
//! 方法、可修改的参数、调用链游标以及供通知之间传递上下文的用户属性。
//! 调用链由拦截器逐个调用 `proceed()` 推进，而不是由外层循环驱动。

use crate::advice::MethodInterceptor;
use crate::error::AopError;
use crate::metadata::{ClassRef, MethodSignature, Target, Value};
use crate::method_matcher::MethodMatcher;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 调用链中的一个元素
#[derive(Clone)]
pub enum ChainElement {
    /// 静态匹配已确定适用的拦截器
    Interceptor(Arc<dyn MethodInterceptor>),
    /// 需要在调用时用实际参数再次判断的拦截器
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        matcher: Arc<dyn MethodMatcher>,
    },
}

impl ChainElement {
    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainElement::Interceptor(interceptor) => interceptor,
            ChainElement::Dynamic { interceptor, .. } => interceptor,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ChainElement::Dynamic { .. })
    }
}

impl fmt::Debug for ChainElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainElement::Interceptor(i) => write!(f, "Interceptor({})", i.name()),
            ChainElement::Dynamic { interceptor, .. } => write!(f, "Dynamic({})", interceptor.name()),
        }
    }
}

/// 已解析的调用链，整体替换，从不原地修改
pub type InterceptorChain = Arc<[ChainElement]>;

/// 一次方法调用
pub struct MethodInvocation {
    proxy: Value,
    target: Option<Target>,
    target_class: Option<ClassRef>,
    method: MethodSignature,
    arguments: Vec<Value>,
    chain: InterceptorChain,
    cursor: usize,
    depth: usize,
    completed: bool,
    user_attributes: HashMap<String, Value>,
}

impl MethodInvocation {
    pub fn new(
        proxy: Value,
        target: Option<Target>,
        target_class: Option<ClassRef>,
        method: MethodSignature,
        arguments: Vec<Value>,
        chain: InterceptorChain,
    ) -> Self {
        Self {
            proxy,
            target,
            target_class,
            method,
            arguments,
            chain,
            cursor: 0,
            depth: 0,
            completed: false,
            user_attributes: HashMap::new(),
        }
    }

    /// 调用到达时经过的代理前端
    pub fn proxy(&self) -> &Value {
        &self.proxy
    }

    /// 真实目标
    pub fn this(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn target_class(&self) -> Option<&ClassRef> {
        self.target_class.as_ref()
    }

    pub fn method(&self) -> &MethodSignature {
        &self.method
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// 替换参数，后续拦截器与目标方法看到新参数
    pub fn set_arguments(&mut self, arguments: Vec<Value>) {
        self.arguments = arguments;
    }

    /// 替换单个参数，下标越界时返回 false
    pub fn set_argument(&mut self, index: usize, value: Value) -> bool {
        match self.arguments.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn user_attribute(&self, key: &str) -> Option<&Value> {
        self.user_attributes.get(key)
    }

    pub fn set_user_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.user_attributes.insert(key.into(), value);
    }

    pub fn remove_user_attribute(&mut self, key: &str) -> Option<Value> {
        self.user_attributes.remove(key)
    }

    /// 当前游标位置（下一个将执行的链元素下标）
    pub fn current_position(&self) -> usize {
        self.cursor
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// 最外层的 proceed() 是否已经返回
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// 继续执行调用链
    ///
    /// 游标走完后调用真实方法。拦截器返回后游标复位，因此同一个拦截器
    /// 可以多次调用 `proceed()` 重新执行下游。最外层调用返回后本次调用
    /// 即告完成，再次调用返回 [`AopError::InvocationCompleted`]。
    pub fn proceed(&mut self) -> anyhow::Result<Value> {
        if self.depth == 0 && self.completed {
            return Err(AopError::InvocationCompleted(self.method.to_string()).into());
        }

        self.depth += 1;
        let result = self.proceed_at_cursor();
        self.depth -= 1;
        if self.depth == 0 {
            self.completed = true;
        }
        result
    }

    fn proceed_at_cursor(&mut self) -> anyhow::Result<Value> {
        let position = self.cursor;
        if position >= self.chain.len() {
            return self.invoke_joinpoint();
        }

        let element = self.chain[position].clone();
        self.cursor = position + 1;
        let result = match &element {
            ChainElement::Interceptor(interceptor) => interceptor.invoke(self),
            ChainElement::Dynamic { interceptor, matcher } => {
                let class = self.target_class.clone();
                if matcher.matches_args(&self.method, class.as_deref(), &self.arguments) {
                    interceptor.invoke(self)
                } else {
                    tracing::trace!("Dynamic matcher skipped {} for {}", interceptor.name(), self.method);
                    self.proceed_at_cursor()
                }
            }
        };
        self.cursor = position;
        result
    }

    /// 调用真实方法
    fn invoke_joinpoint(&self) -> anyhow::Result<Value> {
        match &self.target {
            Some(target) => target.clone().invoke(&self.method, &self.arguments),
            None => Err(AopError::NoTarget(self.method.to_string()).into()),
        }
    }

    /// 复制当前调用，用于延迟或重复执行连接点
    ///
    /// 副本从当前游标继续，拥有独立的参数数组和用户属性
    pub fn invocable_clone(&self) -> MethodInvocation {
        self.invocable_clone_with(self.arguments.clone())
    }

    /// 复制当前调用并使用新的参数
    pub fn invocable_clone_with(&self, arguments: Vec<Value>) -> MethodInvocation {
        MethodInvocation {
            proxy: self.proxy.clone(),
            target: self.target.clone(),
            target_class: self.target_class.clone(),
            method: self.method.clone(),
            arguments,
            chain: self.chain.clone(),
            cursor: self.cursor,
            depth: 0,
            completed: false,
            user_attributes: self.user_attributes.clone(),
        }
    }
}

impl fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("method", &self.method.to_string())
            .field("target_class", &self.target_class.as_ref().map(|c| c.name().to_string()))
            .field("arguments", &self.arguments)
            .field("position", &self.cursor)
            .field("chain_len", &self.chain.len())
            .field("completed", &self.completed)
            .finish()
    }
}

impl fmt::Display for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::interceptor_fn;
    use crate::metadata::Invocable;
    use parking_lot::Mutex;

    struct Echo {
        calls: Mutex<Vec<String>>,
    }

    impl Invocable for Echo {
        fn invoke(self: Arc<Self>, method: &MethodSignature, args: &[Value]) -> anyhow::Result<Value> {
            let arg = args
                .first()
                .and_then(|v| v.downcast_ref::<String>())
                .cloned()
                .unwrap_or_default();
            self.calls.lock().push(arg.clone());
            match method.name() {
                "fail" => anyhow::bail!("failed on {}", arg),
                _ => Ok(Value::new(arg)),
            }
        }
    }

    fn echo() -> Arc<Echo> {
        Arc::new(Echo {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn invocation(target: Arc<Echo>, name: &str, chain: Vec<ChainElement>) -> MethodInvocation {
        let target: Target = target;
        MethodInvocation::new(
            Value::unit(),
            Some(target),
            None,
            MethodSignature::new("Echo", name).with_params(["String"]),
            vec![Value::new("hello".to_string())],
            chain.into(),
        )
    }

    #[test]
    fn test_empty_chain_invokes_target() {
        let target = echo();
        let mut inv = invocation(target.clone(), "say", Vec::new());
        let result = inv.proceed().unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "hello");
        assert!(inv.is_completed());
    }

    #[test]
    fn test_proceed_after_completion_fails() {
        let mut inv = invocation(echo(), "say", Vec::new());
        inv.proceed().unwrap();
        let err = inv.proceed().unwrap_err();
        assert!(matches!(err.downcast_ref::<AopError>(), Some(AopError::InvocationCompleted(_))));
    }

    #[test]
    fn test_interceptor_can_short_circuit() {
        let target = echo();
        let cache = ChainElement::Interceptor(Arc::new(interceptor_fn("cache", |_| Ok(Value::new("cached".to_string())))));
        let mut inv = invocation(target.clone(), "say", vec![cache]);

        let result = inv.proceed().unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "cached");
        assert!(target.calls.lock().is_empty());
    }

    #[test]
    fn test_retry_reruns_downstream() {
        let target = echo();
        let retry = ChainElement::Interceptor(Arc::new(interceptor_fn("retry", |inv| {
            let first = inv.proceed();
            assert!(first.is_err());
            inv.set_argument(0, Value::new("second".to_string()));
            inv.proceed()
        })));
        let mut inv = invocation(target.clone(), "fail", vec![retry]);

        let err = inv.proceed().unwrap_err();
        assert_eq!(err.to_string(), "failed on second");
        assert_eq!(*target.calls.lock(), vec!["hello".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_argument_override_reaches_target() {
        let target = echo();
        let rewrite = ChainElement::Interceptor(Arc::new(interceptor_fn("rewrite", |inv| {
            inv.set_arguments(vec![Value::new("rewritten".to_string())]);
            inv.proceed()
        })));
        let mut inv = invocation(target, "say", vec![rewrite]);
        assert_eq!(inv.proceed().unwrap().downcast_ref::<String>().unwrap(), "rewritten");
    }

    #[test]
    fn test_user_attributes_pass_context_between_interceptors() {
        let first = ChainElement::Interceptor(Arc::new(interceptor_fn("first", |inv| {
            inv.set_user_attribute("tx", Value::new(42u32));
            inv.proceed()
        })));
        let second = ChainElement::Interceptor(Arc::new(interceptor_fn("second", |inv| {
            let tx = *inv.user_attribute("tx").and_then(|v| v.downcast_ref::<u32>()).unwrap();
            assert_eq!(tx, 42);
            inv.proceed()
        })));
        let mut inv = invocation(echo(), "say", vec![first, second]);
        assert!(inv.proceed().is_ok());
    }

    #[test]
    fn test_missing_target_is_reported() {
        let mut inv = MethodInvocation::new(
            Value::unit(),
            None,
            None,
            MethodSignature::new("Echo", "say"),
            Vec::new(),
            Vec::new().into(),
        );
        let err = inv.proceed().unwrap_err();
        assert!(matches!(err.downcast_ref::<AopError>(), Some(AopError::NoTarget(_))));
    }
}
