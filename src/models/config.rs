// 蜜罐配置数据结构
// 对应 YAML 配置文件，未知字段一律拒绝

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::constants::defaults;
use crate::ssh::HoneypotError;

// ======================== 主配置结构 ========================

/// 蜜罐配置（启动时解析一次，之后只读）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub ssh_proto: SshProtoConfig,
}

// ======================== 服务端设置 ========================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// 监听地址（host:port）
    pub listen_address: String,
    /// 主机私钥文件路径，顺序即算法偏好顺序
    pub host_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: defaults::LISTEN_ADDRESS.to_string(),
            host_keys: Vec::new(),
        }
    }
}

// ======================== 日志设置 ========================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// 审计日志文件，为空时输出到 stdout
    pub file: Option<String>,
    pub json: bool,
    pub timestamps: bool,
    /// 是否输出 debug_* 事件
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            json: false,
            timestamps: true,
            debug: false,
        }
    }
}

// ======================== 认证设置 ========================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// 每个连接允许的认证次数，0 表示使用传输层默认值
    pub max_tries: u32,
    /// 允许 none 方法直接登录
    pub no_auth: bool,
    pub password_auth: CommonAuthPolicy,
    pub public_key_auth: CommonAuthPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_tries: 0,
            no_auth: false,
            password_auth: CommonAuthPolicy {
                enabled: true,
                accepted: true,
            },
            public_key_auth: CommonAuthPolicy {
                enabled: true,
                accepted: false,
            },
        }
    }
}

/// 单一凭据类型的认证策略
///
/// `enabled` 为 false 时不提供该认证方式；否则所有尝试统一按 `accepted` 处理，
/// 与凭据内容无关。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommonAuthPolicy {
    pub enabled: bool,
    pub accepted: bool,
}

// ======================== SSH 协议设置 ========================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshProtoConfig {
    /// 服务端版本标识
    pub version: String,
    /// 认证前横幅，为空时不发送
    pub banner: String,
}

impl Default for SshProtoConfig {
    fn default() -> Self {
        Self {
            version: defaults::SERVER_VERSION.to_string(),
            banner: defaults::BANNER.to_string(),
        }
    }
}

impl Config {
    /// 从 YAML 文本解析配置
    ///
    /// 文档逐层覆盖在默认配置之上：只写出部分字段的小节保留其余字段的默认值。
    /// 空文档等同于全部默认值。
    pub fn from_yaml(content: &str) -> Result<Self, HoneypotError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let overlay: Value = serde_yaml::from_str(content)?;
        let mut merged = serde_yaml::to_value(Self::default())?;
        merge_values(&mut merged, overlay);
        Ok(serde_yaml::from_value(merged)?)
    }
}

/// 深度合并：两侧都是映射时逐键递归，null 保留默认值，否则整体替换
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_values(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
