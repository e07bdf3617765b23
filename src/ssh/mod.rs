// SSH 蜜罐模块
//
// 模块结构:
// - config: russh 服务端配置 (认证方式、版本串、主机密钥)
// - error: 错误类型 (HoneypotError)
// - event: 审计事件 (LogEvent, LogRecord)
// - logger: 审计日志输出 (AuditLogger)
// - auth: 认证决策 (AuthCallbacks, AuthOutcome)
// - session: 单连接会话记录 (SessionRecorder)
// - handler: russh Handler 实现
// - server: 监听与连接分发

pub mod auth;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod logger;
pub mod server;
pub mod session;

// 公开导出
pub use error::HoneypotError;
pub use logger::AuditLogger;
pub use server::HoneypotServer;
