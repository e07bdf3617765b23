// 蜜罐错误类型定义

use std::path::PathBuf;

use thiserror::Error;

/// 蜜罐错误类型
///
/// 启动阶段出现的错误均为致命错误；认证被拒绝不属于错误，见 `AuthOutcome`。
#[derive(Debug, Error)]
pub enum HoneypotError {
    /// 配置错误（未知字段、类型不符等）
    #[error("Configuration error: {0}")]
    Config(String),

    /// 主机密钥生成或写入失败
    #[error("Host key generation failed for {path:?}: {reason}")]
    KeyGeneration { path: PathBuf, reason: String },

    /// 主机密钥无法解析
    #[error("Failed to parse host key {path:?}: {reason}")]
    KeyParse { path: PathBuf, reason: String },

    /// 审计日志目标无法打开
    #[error("Failed to open log destination {path:?}: {source}")]
    LogDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO 错误（网络连接等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH 协议错误
    #[error("SSH protocol error: {0}")]
    Protocol(String),
}

impl From<russh::Error> for HoneypotError {
    fn from(e: russh::Error) -> Self {
        HoneypotError::Protocol(e.to_string())
    }
}

impl From<serde_yaml::Error> for HoneypotError {
    fn from(e: serde_yaml::Error) -> Self {
        HoneypotError::Config(e.to_string())
    }
}
