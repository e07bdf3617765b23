// russh 服务端配置构建

use std::time::Duration;

use russh::keys::PrivateKey;
use russh::{MethodKind, MethodSet, SshId};

use crate::models::Config;

/// 认证失败后的延迟
const AUTH_REJECTION_TIME: Duration = Duration::from_secs(1);

/// 按配置列出提供给客户端的认证方式
pub fn auth_methods(config: &Config) -> Vec<MethodKind> {
    let mut methods = Vec::new();
    if config.auth.no_auth {
        methods.push(MethodKind::None);
    }
    if config.auth.public_key_auth.enabled {
        methods.push(MethodKind::PublicKey);
    }
    if config.auth.password_auth.enabled {
        methods.push(MethodKind::Password);
    }
    methods
}

/// 构建 russh 服务端配置，主机密钥顺序即偏好顺序
pub fn to_russh_config(config: &Config, host_keys: Vec<PrivateKey>) -> russh::server::Config {
    let mut russh_config = russh::server::Config {
        server_id: SshId::Standard(config.ssh_proto.version.clone()),
        methods: MethodSet::from(&auth_methods(config)[..]),
        keys: host_keys,
        auth_rejection_time: AUTH_REJECTION_TIME,
        ..Default::default()
    };
    // 0 表示沿用 russh 默认值
    if config.auth.max_tries > 0 {
        russh_config.max_auth_attempts = config.auth.max_tries as usize;
    }
    russh_config
}
