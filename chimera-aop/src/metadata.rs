//! 运行时元数据
//!
//! Rust 没有运行时反射，拦截核心需要的类型信息由 [`ClassInfo`] 显式描述，
//! 方法身份由值类型 [`MethodSignature`] 表示（同时作为调用链缓存的键），
//! 参数、返回值、目标对象和代理前端统一使用类型擦除的 [`Value`]。

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 共享的类型描述
pub type ClassRef = Arc<ClassInfo>;

/// 真实目标对象
pub type Target = Arc<dyn Invocable>;

/// 类型描述
///
/// 记录类型名、父类、直接实现的接口以及声明的方法。
/// 相等性与哈希只依据类型名。
#[derive(Debug, Clone)]
pub struct ClassInfo {
    name: String,
    superclass: Option<ClassRef>,
    interfaces: Vec<String>,
    methods: Vec<MethodSignature>,
    is_interface: bool,
    is_final: bool,
    is_proxy_class: bool,
}

impl ClassInfo {
    /// 创建新的类型描述
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            is_interface: false,
            is_final: false,
            is_proxy_class: false,
        }
    }

    /// 创建接口类型描述
    pub fn interface(name: impl Into<String>) -> Self {
        let mut info = Self::new(name);
        info.is_interface = true;
        info
    }

    /// 设置父类
    pub fn extends(mut self, superclass: ClassRef) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// 添加实现的接口
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        let interface = interface.into();
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
        self
    }

    /// 添加声明的方法
    pub fn method(mut self, method: MethodSignature) -> Self {
        self.methods.push(method);
        self
    }

    /// 标记为不可继承（无法生成子类代理）
    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// 标记为已生成的代理类型
    pub fn proxy_class(mut self) -> Self {
        self.is_proxy_class = true;
        self
    }

    pub fn into_ref(self) -> ClassRef {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    /// 直接实现的接口
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// 本类型及所有父类实现的接口（去重，保持声明顺序）
    pub fn all_interfaces(&self) -> Vec<String> {
        let mut result = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            for interface in &class.interfaces {
                if !result.contains(interface) {
                    result.push(interface.clone());
                }
            }
            current = class.superclass.as_deref();
        }
        result
    }

    /// 本类型声明的方法
    pub fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    /// 本类型及父类的全部方法，子类声明的同形方法覆盖父类
    pub fn all_methods(&self) -> Vec<MethodSignature> {
        let mut result: Vec<MethodSignature> = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            for method in &class.methods {
                if !result.iter().any(|m| m.same_shape(method)) {
                    result.push(method.clone());
                }
            }
            current = class.superclass.as_deref();
        }
        result
    }

    pub fn is_interface(&self) -> bool {
        self.is_interface
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn is_proxy_class(&self) -> bool {
        self.is_proxy_class
    }

    /// 判断本类型是否可赋值给 `type_name`（自身、父类链或任一接口）
    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == type_name || class.interfaces.iter().any(|i| i == type_name) {
                return true;
            }
            current = class.superclass.as_deref();
        }
        false
    }
}

impl PartialEq for ClassInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassInfo {}

impl Hash for ClassInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 方法签名
///
/// 声明类型 + 方法名 + 有序参数类型名，不依赖任何反射句柄。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    declaring_type: String,
    name: String,
    parameter_types: Vec<String>,
}

impl MethodSignature {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            parameter_types: Vec::new(),
        }
    }

    /// 设置参数类型列表
    pub fn with_params<I, S>(mut self, parameter_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = parameter_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    /// `Type.method` 形式的限定名
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }

    /// 方法名与参数列表相同（忽略声明类型），用于判断覆盖关系
    pub fn same_shape(&self, other: &MethodSignature) -> bool {
        self.name == other.name && self.parameter_types == other.parameter_types
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.declaring_type,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

/// 类型擦除的共享值
///
/// 克隆只复制引用；参数数组中的每个槽位可以被独立替换。
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 包装已有的 Arc，保留对象身份
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 无返回值方法的返回值
    pub fn unit() -> Self {
        Self::new(())
    }

    pub fn is_unit(&self) -> bool {
        self.inner.is::<()>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 本值是否与给定的 Arc 指向同一个对象
    pub fn is_same_object<T: ?Sized>(&self, other: &Arc<T>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner) as *const (),
            Arc::as_ptr(other) as *const (),
        )
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.type_name)
    }
}

/// 可被拦截的真实目标
///
/// 代替反射调用：目标自行根据方法签名分派。返回 `Value::from_arc(self)`
/// 表示返回自身，代理会将其替换为代理前端。
pub trait Invocable: Send + Sync {
    fn invoke(self: Arc<Self>, method: &MethodSignature, args: &[Value]) -> anyhow::Result<Value>;
}
