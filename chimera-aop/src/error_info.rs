//! 错误摘要
//!
//! 调用链上传播的是 `anyhow::Error`，异常通知和日志需要一个可以
//! 保存、比较和打印的摘要：消息、类型名和原因链。

use std::error::Error;
use std::fmt;

/// 错误摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// 最外层错误的消息
    pub message: String,

    /// 最外层错误的类型名
    pub error_type: String,

    /// 原因链，由近到远，不含最外层错误
    pub source_chain: Vec<String>,
}

/// 沿 `source()` 收集原因链
fn causes(first: Option<&(dyn Error + 'static)>) -> Vec<String> {
    std::iter::successors(first, |&e| e.source()).map(|e| e.to_string()).collect()
}

impl ErrorInfo {
    /// anyhow 擦除了具体类型，`error_type` 取调试表示的首个标识符
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let outer: &(dyn Error + 'static) = error.as_ref();
        let debug = format!("{:?}", outer);
        let error_type = debug
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .find(|s| !s.is_empty())
            .unwrap_or("Unknown")
            .to_string();

        Self {
            message: error.to_string(),
            error_type,
            source_chain: causes(outer.source()),
        }
    }

    /// 最深处的原因；没有原因链时就是错误本身
    pub fn root_cause(&self) -> &str {
        self.source_chain.last().unwrap_or(&self.message)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if !self.source_chain.is_empty() {
            write!(f, "\nCaused by:\n  {}", self.source_chain.join("\n  "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[derive(Debug, thiserror::Error)]
    #[error("user {0} not found")]
    struct UserNotFound(u64);

    #[derive(Debug, thiserror::Error)]
    #[error("profile unavailable")]
    struct ProfileUnavailable(#[source] UserNotFound);

    #[test]
    fn test_from_anyhow_keeps_cause_chain() {
        let error = Err::<(), _>(UserNotFound(7))
            .context("loading profile")
            .unwrap_err();
        let info = ErrorInfo::from_anyhow(&error);

        assert_eq!(info.message, "loading profile");
        assert_eq!(info.source_chain, vec!["user 7 not found".to_string()]);
        assert_eq!(info.root_cause(), "user 7 not found");
        assert_eq!(info.to_string(), "loading profile\nCaused by:\n  user 7 not found");
    }

    #[test]
    fn test_from_anyhow_type_name() {
        let error = anyhow::Error::new(UserNotFound(1));
        let info = ErrorInfo::from_anyhow(&error);
        assert_eq!(info.error_type, "UserNotFound");
        assert_eq!(info.root_cause(), "user 1 not found");
        assert_eq!(info.to_string(), "user 1 not found");
    }

    #[test]
    fn test_nested_sources_are_collected_in_order() {
        let error = anyhow::Error::new(ProfileUnavailable(UserNotFound(3))).context("rendering page");
        let info = ErrorInfo::from_anyhow(&error);
        assert_eq!(
            info.source_chain,
            vec!["profile unavailable".to_string(), "user 3 not found".to_string()]
        );
        assert_eq!(info.root_cause(), "user 3 not found");
    }
}
