// 单个连接的会话记录
// 维护通道编号与类型，把传输层回调转换为审计事件

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use super::event::LogEvent;
use super::logger::AuditLogger;

/// 通道类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Session,
    DirectTcpip,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::DirectTcpip => "direct-tcpip",
        }
    }
}

/// 客户端输入转为文本：合法 UTF-8 原样保留，非法字节写作 `\xNN`
pub fn escape_input(data: &[u8]) -> String {
    let mut text = String::with_capacity(data.len());
    for chunk in data.utf8_chunks() {
        text.push_str(chunk.valid());
        for byte in chunk.invalid() {
            text.push_str(&format!("\\x{:02x}", byte));
        }
    }
    text
}

#[derive(Clone, Copy, Debug)]
struct TrackedChannel {
    id: u32,
    kind: ChannelKind,
}

/// 连接会话记录器
///
/// `K` 是传输层的通道标识；记录到日志的 channel_id 由本连接按打开顺序从 0 分配。
/// 记录器被 drop 时为仍未关闭的通道补发关闭事件，若连接已建立则记录 connection_close。
pub struct SessionRecorder<K: Hash + Eq + Copy> {
    source: String,
    logger: Arc<AuditLogger>,
    channels: HashMap<K, TrackedChannel>,
    next_channel_id: u32,
    established: bool,
}

impl<K: Hash + Eq + Copy> SessionRecorder<K> {
    pub fn new(source: String, logger: Arc<AuditLogger>) -> Self {
        Self {
            source,
            logger,
            channels: HashMap::new(),
            next_channel_id: 0,
            established: false,
        }
    }

    /// 客户端地址
    pub fn source(&self) -> &str {
        &self.source
    }

    fn emit(&self, event: LogEvent) {
        self.logger.emit(&event, &self.source);
    }

    /// 认证完成，连接建立
    pub fn connection_established(&mut self, client_version: String) {
        if self.established {
            return;
        }
        self.established = true;
        self.emit(LogEvent::Connection { client_version });
    }

    /// 记录全局请求；`event` 为 None 表示该请求只在 debug 模式下可见
    pub fn global_request(&self, request_type: &str, payload: String, event: Option<LogEvent>) {
        self.emit(LogEvent::DebugGlobalRequest {
            request_type: request_type.to_string(),
            want_reply: true,
            payload,
        });
        if let Some(event) = event {
            self.emit(event);
        }
    }

    /// 分配通道编号并记录 debug_channel
    fn allocate(&mut self, channel_type: &str, extra_data: String) -> u32 {
        let id = self.next_channel_id;
        self.next_channel_id += 1;
        self.emit(LogEvent::DebugChannel {
            channel_id: id,
            channel_type: channel_type.to_string(),
            extra_data,
        });
        id
    }

    fn open(&mut self, key: K, kind: ChannelKind, extra_data: String) -> u32 {
        let id = self.allocate(kind.as_str(), extra_data);
        self.channels.insert(key, TrackedChannel { id, kind });
        id
    }

    /// 记录被拒绝的通道类型，只在 debug 模式下可见，不跟踪后续请求
    pub fn unsupported_channel(&mut self, channel_type: &str, extra_data: String) -> u32 {
        self.allocate(channel_type, extra_data)
    }

    /// 打开 session 通道
    pub fn open_session(&mut self, key: K) -> u32 {
        let id = self.open(key, ChannelKind::Session, String::new());
        self.emit(LogEvent::Session { channel_id: id });
        id
    }

    /// 打开 direct-tcpip 通道
    pub fn open_direct_tcpip(&mut self, key: K, from: String, to: String) -> u32 {
        let extra_data = format!("{} -> {}", from, to);
        let id = self.open(key, ChannelKind::DirectTcpip, extra_data);
        self.emit(LogEvent::DirectTcpip {
            channel_id: id,
            from,
            to,
        });
        id
    }

    /// 记录通道请求
    ///
    /// 请求本身总以 debug 事件记录；`event` 仅对 session 通道生效，返回值表示是否接受该请求。
    pub fn channel_request<F>(&self, key: K, request_type: &str, payload: String, event: F) -> bool
    where
        F: FnOnce(u32) -> Option<LogEvent>,
    {
        let Some(channel) = self.channels.get(&key).copied() else {
            tracing::debug!(
                "[{}] {} request on unknown channel",
                self.source,
                request_type
            );
            return false;
        };

        self.emit(LogEvent::DebugChannelRequest {
            channel_id: channel.id,
            request_type: request_type.to_string(),
            want_reply: true,
            payload,
        });

        if channel.kind != ChannelKind::Session {
            return false;
        }
        match event(channel.id) {
            Some(event) => {
                self.emit(event);
                true
            }
            None => false,
        }
    }

    /// 记录通道输入
    pub fn input(&self, key: K, data: &[u8]) {
        let Some(channel) = self.channels.get(&key) else {
            return;
        };
        let input = escape_input(data);
        self.emit(match channel.kind {
            ChannelKind::Session => LogEvent::SessionInput {
                channel_id: channel.id,
                input,
            },
            ChannelKind::DirectTcpip => LogEvent::DirectTcpipInput {
                channel_id: channel.id,
                input,
            },
        });
    }

    /// 关闭通道，每个通道只记录一次
    pub fn close(&mut self, key: K) {
        if let Some(channel) = self.channels.remove(&key) {
            self.emit_close(channel);
        }
    }

    fn emit_close(&self, channel: TrackedChannel) {
        self.emit(match channel.kind {
            ChannelKind::Session => LogEvent::SessionClose {
                channel_id: channel.id,
            },
            ChannelKind::DirectTcpip => LogEvent::DirectTcpipClose {
                channel_id: channel.id,
            },
        });
    }
}

impl<K: Hash + Eq + Copy> Drop for SessionRecorder<K> {
    fn drop(&mut self) {
        let mut remaining: Vec<TrackedChannel> = self.channels.drain().map(|(_, c)| c).collect();
        remaining.sort_by_key(|channel| channel.id);
        for channel in remaining {
            self.emit_close(channel);
        }
        if self.established {
            self.emit(LogEvent::ConnectionClose {});
        }
    }
}
