// 审计事件定义
// 封闭的事件集合：每种事件有固定字段、稳定的 event_type 以及两种渲染方式
// （单行文本 Display 与 JSON 结构）

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

/// 事件类别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventCategory {
    /// 连接级事件（认证、连接建立/关闭、全局请求）
    Connection,
    /// 通道级事件（携带 channel_id）
    Channel,
    /// 仅在 debug 模式下输出
    Debug,
}

/// 审计事件
///
/// JSON 形式为 `{"event_type": "...", "event": {...}}`，字段集合与 Display 输出一致。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "event", rename_all = "snake_case")]
pub enum LogEvent {
    // ---- 认证 ----
    PasswordAuth {
        user: String,
        accepted: bool,
        password: String,
    },
    PublicKeyAuth {
        user: String,
        accepted: bool,
        /// 公钥 SHA256 指纹，不记录原始公钥
        public_key: String,
    },

    // ---- 连接 / 全局请求 ----
    Connection {
        client_version: String,
    },
    ConnectionClose {},
    TcpipForward {
        address: String,
    },
    CancelTcpipForward {
        address: String,
    },
    NoMoreSessions {},

    // ---- 通道 ----
    Session {
        channel_id: u32,
    },
    SessionClose {
        channel_id: u32,
    },
    SessionInput {
        channel_id: u32,
        input: String,
    },
    DirectTcpip {
        channel_id: u32,
        from: String,
        to: String,
    },
    DirectTcpipClose {
        channel_id: u32,
    },
    DirectTcpipInput {
        channel_id: u32,
        input: String,
    },
    Pty {
        channel_id: u32,
        terminal: String,
        width: u32,
        height: u32,
    },
    Shell {
        channel_id: u32,
    },
    Exec {
        channel_id: u32,
        command: String,
    },
    Subsystem {
        channel_id: u32,
        subsystem: String,
    },
    X11 {
        channel_id: u32,
        screen: u32,
    },
    Env {
        channel_id: u32,
        name: String,
        value: String,
    },
    WindowChange {
        channel_id: u32,
        width: u32,
        height: u32,
    },

    // ---- 调试 ----
    DebugGlobalRequest {
        request_type: String,
        want_reply: bool,
        payload: String,
    },
    DebugChannel {
        channel_id: u32,
        channel_type: String,
        extra_data: String,
    },
    DebugChannelRequest {
        channel_id: u32,
        request_type: String,
        want_reply: bool,
        payload: String,
    },
}

impl LogEvent {
    /// 稳定的事件类型标识（与 JSON 中的 event_type 一致）
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PasswordAuth { .. } => "password_auth",
            Self::PublicKeyAuth { .. } => "public_key_auth",
            Self::Connection { .. } => "connection",
            Self::ConnectionClose {} => "connection_close",
            Self::TcpipForward { .. } => "tcpip_forward",
            Self::CancelTcpipForward { .. } => "cancel_tcpip_forward",
            Self::NoMoreSessions {} => "no_more_sessions",
            Self::Session { .. } => "session",
            Self::SessionClose { .. } => "session_close",
            Self::SessionInput { .. } => "session_input",
            Self::DirectTcpip { .. } => "direct_tcpip",
            Self::DirectTcpipClose { .. } => "direct_tcpip_close",
            Self::DirectTcpipInput { .. } => "direct_tcpip_input",
            Self::Pty { .. } => "pty",
            Self::Shell { .. } => "shell",
            Self::Exec { .. } => "exec",
            Self::Subsystem { .. } => "subsystem",
            Self::X11 { .. } => "x11",
            Self::Env { .. } => "env",
            Self::WindowChange { .. } => "window_change",
            Self::DebugGlobalRequest { .. } => "debug_global_request",
            Self::DebugChannel { .. } => "debug_channel",
            Self::DebugChannelRequest { .. } => "debug_channel_request",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Self::PasswordAuth { .. }
            | Self::PublicKeyAuth { .. }
            | Self::Connection { .. }
            | Self::ConnectionClose {}
            | Self::TcpipForward { .. }
            | Self::CancelTcpipForward { .. }
            | Self::NoMoreSessions {} => EventCategory::Connection,
            Self::Session { .. }
            | Self::SessionClose { .. }
            | Self::SessionInput { .. }
            | Self::DirectTcpip { .. }
            | Self::DirectTcpipClose { .. }
            | Self::DirectTcpipInput { .. }
            | Self::Pty { .. }
            | Self::Shell { .. }
            | Self::Exec { .. }
            | Self::Subsystem { .. }
            | Self::X11 { .. }
            | Self::Env { .. }
            | Self::WindowChange { .. } => EventCategory::Channel,
            Self::DebugGlobalRequest { .. }
            | Self::DebugChannel { .. }
            | Self::DebugChannelRequest { .. } => EventCategory::Debug,
        }
    }

    pub fn is_debug(&self) -> bool {
        self.category() == EventCategory::Debug
    }
}

/// 认证结果的文本形式
fn verdict(accepted: bool) -> &'static str {
    if accepted {
        "accepted"
    } else {
        "rejected"
    }
}

/// 单行文本渲染
impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PasswordAuth {
                user,
                accepted,
                password,
            } => write!(
                f,
                "authentication for user {:?} with password {:?} {}",
                user,
                password,
                verdict(*accepted)
            ),
            Self::PublicKeyAuth {
                user,
                accepted,
                public_key,
            } => write!(
                f,
                "authentication for user {:?} with public key {:?} {}",
                user,
                public_key,
                verdict(*accepted)
            ),
            Self::Connection { client_version } => write!(
                f,
                "connection with client version {:?} established",
                client_version
            ),
            Self::ConnectionClose {} => write!(f, "connection closed"),
            Self::TcpipForward { address } => {
                write!(f, "TCP/IP forwarding on {} requested", address)
            }
            Self::CancelTcpipForward { address } => {
                write!(f, "TCP/IP forwarding on {} canceled", address)
            }
            Self::NoMoreSessions {} => {
                write!(f, "rejection of further session channels requested")
            }
            Self::Session { channel_id } => {
                write!(f, "[channel {}] session requested", channel_id)
            }
            Self::SessionClose { channel_id } | Self::DirectTcpipClose { channel_id } => {
                write!(f, "[channel {}] closed", channel_id)
            }
            Self::SessionInput { channel_id, input }
            | Self::DirectTcpipInput { channel_id, input } => {
                write!(f, "[channel {}] input: {:?}", channel_id, input)
            }
            Self::DirectTcpip {
                channel_id,
                from,
                to,
            } => write!(
                f,
                "[channel {}] direct TCP/IP forwarding from {} to {} requested",
                channel_id, from, to
            ),
            Self::Pty {
                channel_id,
                terminal,
                width,
                height,
            } => write!(
                f,
                "[channel {}] PTY using terminal {:?} (size {}x{}) requested",
                channel_id, terminal, width, height
            ),
            Self::Shell { channel_id } => write!(f, "[channel {}] shell requested", channel_id),
            Self::Exec {
                channel_id,
                command,
            } => write!(f, "[channel {}] command {:?} requested", channel_id, command),
            Self::Subsystem {
                channel_id,
                subsystem,
            } => write!(
                f,
                "[channel {}] subsystem {:?} requested",
                channel_id, subsystem
            ),
            Self::X11 { channel_id, screen } => write!(
                f,
                "[channel {}] X11 forwarding on screen {} requested",
                channel_id, screen
            ),
            Self::Env {
                channel_id,
                name,
                value,
            } => write!(
                f,
                "[channel {}] environment variable {:?} with value {:?} requested",
                channel_id, name, value
            ),
            Self::WindowChange {
                channel_id,
                width,
                height,
            } => write!(
                f,
                "[channel {}] window size change to {}x{} requested",
                channel_id, width, height
            ),
            // 调试事件直接内嵌字段的 JSON
            Self::DebugGlobalRequest {
                request_type,
                want_reply,
                payload,
            } => write!(
                f,
                "DEBUG global request received: {}",
                json!({
                    "request_type": request_type,
                    "want_reply": want_reply,
                    "payload": payload,
                })
            ),
            Self::DebugChannel {
                channel_id,
                channel_type,
                extra_data,
            } => write!(
                f,
                "DEBUG new channel requested: {}",
                json!({
                    "channel_id": channel_id,
                    "channel_type": channel_type,
                    "extra_data": extra_data,
                })
            ),
            Self::DebugChannelRequest {
                channel_id,
                request_type,
                want_reply,
                payload,
            } => write!(
                f,
                "DEBUG channel request received: {}",
                json!({
                    "channel_id": channel_id,
                    "request_type": request_type,
                    "want_reply": want_reply,
                    "payload": payload,
                })
            ),
        }
    }
}

/// 结构化日志记录（JSON 模式下的一行）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// RFC 3339 时间戳，关闭时间戳时省略
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// 客户端地址
    pub source: String,
    #[serde(flatten)]
    pub event: LogEvent,
}
