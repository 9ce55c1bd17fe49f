//! AOP 配置
//!
//! 从 TOML 的 `[aop]` 表加载，再用 `CHIMERA_AOP_*` 环境变量覆盖：
//!
//! ```toml
//! [aop]
//! enabled = true
//! performance_threshold_ms = 500
//!
//! [aop.proxy]
//! proxy_target_class = true
//! ```

use crate::error::{AopError, AopResult};
use serde::Deserialize;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CHIMERA_AOP_";

/// 代理配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// 强制生成子类代理
    pub proxy_target_class: bool,
    /// 允许激进优化（同样使用子类代理）
    pub optimize: bool,
    /// 代理不暴露 `Advised` 管理接口
    pub opaque: bool,
    /// 冻结后不允许再增删通知器
    pub frozen: bool,
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn proxy_target_class(mut self, value: bool) -> Self {
        self.proxy_target_class = value;
        self
    }

    pub fn optimize(mut self, value: bool) -> Self {
        self.optimize = value;
        self
    }

    pub fn opaque(mut self, value: bool) -> Self {
        self.opaque = value;
        self
    }

    pub fn frozen(mut self, value: bool) -> Self {
        self.frozen = value;
        self
    }
}

/// AOP 全局属性
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AopProperties {
    /// 是否启用自动代理
    pub enabled: bool,
    /// 默认代理配置
    pub proxy: ProxyConfig,
    /// 性能监控拦截器的慢调用阈值（毫秒）
    pub performance_threshold_ms: u64,
}

impl Default for AopProperties {
    fn default() -> Self {
        Self {
            enabled: true,
            proxy: ProxyConfig::default(),
            performance_threshold_ms: 1000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AopDocument {
    #[serde(default)]
    aop: AopProperties,
}

impl AopProperties {
    /// 从 TOML 文本解析，缺少 `[aop]` 表时使用默认值
    pub fn from_toml_str(content: &str) -> AopResult<Self> {
        let document: AopDocument =
            toml::from_str(content).map_err(|e| AopError::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(document.aop)
    }

    /// 默认值叠加环境变量
    pub fn from_env() -> AopResult<Self> {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    /// TOML 文本叠加环境变量
    pub fn load(content: &str) -> AopResult<Self> {
        Self::from_toml_str(content)?.apply_overrides(|key| std::env::var(key).ok())
    }

    /// 应用覆盖项，`lookup` 接收完整的环境变量名
    pub fn apply_overrides<F>(mut self, lookup: F) -> AopResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let key = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = get("ENABLED") {
            self.enabled = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get("PROXY_TARGET_CLASS") {
            self.proxy.proxy_target_class = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get("OPTIMIZE") {
            self.proxy.optimize = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get("OPAQUE") {
            self.proxy.opaque = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get("FROZEN") {
            self.proxy.frozen = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get("PERFORMANCE_THRESHOLD_MS") {
            self.performance_threshold_ms = value
                .trim()
                .parse()
                .map_err(|_| AopError::Config(format!("{} must be an integer, got '{}'", key, value)))?;
        }
        Ok(self)
    }
}

fn parse_bool(key: &str, value: &str) -> AopResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AopError::Config(format!("{} must be a boolean, got '{}'", key, value))),
    }
}
