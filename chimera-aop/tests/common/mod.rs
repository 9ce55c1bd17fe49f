//! 集成测试共用的目标对象与工具
#![allow(dead_code)]

use chimera_aop::{ClassInfo, ClassRef, Invocable, MethodSignature, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// 安装测试日志输出，`RUST_LOG` 控制级别
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// 按发生顺序记录事件
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

pub const USER_SERVICE: &str = "UserService";

pub fn method(name: &str) -> MethodSignature {
    MethodSignature::new(USER_SERVICE, name).with_params(["Entity"])
}

pub fn save() -> MethodSignature {
    method("save")
}

pub fn load() -> MethodSignature {
    method("load")
}

pub fn user_class() -> ClassRef {
    ClassInfo::new("UserServiceImpl")
        .implements(USER_SERVICE)
        .method(save())
        .method(load())
        .method(method("me"))
        .method(method("flaky"))
        .method(method("fail"))
        .into_ref()
}

pub fn id(value: &Value) -> i32 {
    value.downcast_ref::<i32>().copied().unwrap_or_default()
}

/// 测试用的业务对象
///
/// `save`/`load` 返回第一个参数；`me` 返回自身；`flaky` 先失败若干次；`fail` 总是失败
pub struct UserServiceImpl {
    journal: Journal,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl UserServiceImpl {
    pub fn new(journal: Journal) -> Arc<Self> {
        Self::flaky(journal, 0)
    }

    pub fn flaky(journal: Journal, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            journal,
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Invocable for UserServiceImpl {
    fn invoke(self: Arc<Self>, method: &MethodSignature, args: &[Value]) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.push(format!("real:{}", method.name()));
        match method.name() {
            "save" | "load" => Ok(Value::new(args.first().map(id).unwrap_or_default())),
            "me" => Ok(Value::from_arc(self)),
            "flaky" => {
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    anyhow::bail!("transient failure");
                }
                Ok(Value::new("ok".to_string()))
            }
            "fail" => anyhow::bail!("save failed"),
            _ => anyhow::bail!("unknown method {}", method),
        }
    }
}
