// 审计日志输出
// 持有唯一的输出目标（文件或 stdout）与格式策略，所有连接共享

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{Local, SecondsFormat};

use super::error::HoneypotError;
use super::event::{LogEvent, LogRecord};
use crate::models::LoggingConfig;

/// 输出目标
enum Destination {
    Stdout,
    File(File),
}

impl Destination {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            Self::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(line.as_bytes())?;
                stdout.flush()
            }
            Self::File(file) => file.write_all(line.as_bytes()),
        }
    }
}

/// 可变状态，始终在锁内访问
struct SinkState {
    destination: Destination,
    json: bool,
    timestamps: bool,
    debug: bool,
}

impl SinkState {
    /// 渲染一行（含换行符）；debug 事件在非 debug 模式下返回 None
    fn render(&self, event: &LogEvent, source: &str) -> Option<String> {
        if event.is_debug() && !self.debug {
            return None;
        }

        if self.json {
            let record = LogRecord {
                time: self
                    .timestamps
                    .then(|| Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)),
                source: source.to_string(),
                event: event.clone(),
            };
            match serde_json::to_string(&record) {
                Ok(line) => Some(format!("{}\n", line)),
                Err(e) => {
                    tracing::error!("Failed to serialize {} event: {}", event.event_type(), e);
                    None
                }
            }
        } else if self.timestamps {
            Some(format!(
                "{} [{}] {}\n",
                Local::now().format("%Y/%m/%d %H:%M:%S"),
                source,
                event
            ))
        } else {
            Some(format!("[{}] {}\n", source, event))
        }
    }
}

/// 审计日志器
///
/// 渲染与写入都在同一把锁内完成，因此并发 `emit` 不会交错，
/// `configure` 与 `emit` 之间也有全序：不会写入已关闭的句柄。
pub struct AuditLogger {
    state: Mutex<SinkState>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// 输出到 stdout、纯文本、带时间戳、关闭 debug
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                destination: Destination::Stdout,
                json: false,
                timestamps: true,
                debug: false,
            }),
        }
    }

    /// 按日志配置创建
    pub fn from_config(config: &LoggingConfig) -> Result<Self, HoneypotError> {
        let logger = Self::new();
        logger.configure(config)?;
        Ok(logger)
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 重新配置输出目标与格式
    ///
    /// 新文件先打开，成功后才替换；旧文件句柄在替换时关闭。
    /// 打开失败时保持原有配置不变。
    pub fn configure(&self, config: &LoggingConfig) -> Result<(), HoneypotError> {
        let destination = match config.file.as_deref() {
            Some(path) => Destination::File(open_log_file(Path::new(path))?),
            None => Destination::Stdout,
        };

        let mut state = self.lock();
        // 旧的 Destination 在此被 drop
        state.destination = destination;
        state.json = config.json;
        state.timestamps = config.timestamps;
        state.debug = config.debug;
        drop(state);

        tracing::debug!(
            "Audit log configured: file={:?} json={} timestamps={} debug={}",
            config.file,
            config.json,
            config.timestamps,
            config.debug
        );
        Ok(())
    }

    /// 记录事件
    pub fn emit(&self, event: &LogEvent, source: &str) {
        let mut state = self.lock();
        let Some(line) = state.render(event, source) else {
            return;
        };
        if let Err(e) = state.destination.write_line(&line) {
            tracing::error!("Failed to write {} event: {}", event.event_type(), e);
        }
    }
}

/// 以追加方式打开日志文件，不存在则创建
fn open_log_file(path: &Path) -> Result<File, HoneypotError> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options
        .open(path)
        .map_err(|source| HoneypotError::LogDestination {
            path: path.to_path_buf(),
            source,
        })
}
