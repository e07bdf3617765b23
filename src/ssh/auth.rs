// 认证决策
// 蜜罐不校验凭据：每次尝试先原样记录，再按配置策略统一接受或拒绝

use std::sync::Arc;

use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;

use super::event::LogEvent;
use super::logger::AuditLogger;
use crate::models::{CommonAuthPolicy, Config};

/// 认证结果
///
/// 拒绝是正常结果而非错误；接受也不携带任何权限信息。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Accepted,
    Rejected,
}

impl AuthOutcome {
    fn from_policy(accepted: bool) -> Self {
        if accepted {
            Self::Accepted
        } else {
            Self::Rejected
        }
    }

    pub fn is_accepted(&self) -> bool {
        *self == Self::Accepted
    }
}

/// 密码认证回调
pub struct PasswordCallback {
    accepted: bool,
    logger: Arc<AuditLogger>,
}

impl PasswordCallback {
    pub fn check(&self, source: &str, user: &str, password: &str) -> AuthOutcome {
        self.logger.emit(
            &LogEvent::PasswordAuth {
                user: user.to_string(),
                accepted: self.accepted,
                password: password.to_string(),
            },
            source,
        );
        AuthOutcome::from_policy(self.accepted)
    }
}

/// 公钥认证回调，只记录指纹
pub struct PublicKeyCallback {
    accepted: bool,
    logger: Arc<AuditLogger>,
}

impl PublicKeyCallback {
    pub fn check(&self, source: &str, user: &str, key: &PublicKey) -> AuthOutcome {
        self.logger.emit(
            &LogEvent::PublicKeyAuth {
                user: user.to_string(),
                accepted: self.accepted,
                public_key: fingerprint(key),
            },
            source,
        );
        AuthOutcome::from_policy(self.accepted)
    }

    /// 不记录事件的决策，用于同一公钥的重复尝试
    pub fn decision(&self) -> AuthOutcome {
        AuthOutcome::from_policy(self.accepted)
    }
}

/// 公钥 SHA256 指纹（`SHA256:<base64>`）
pub fn fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

/// 规范化横幅文本：统一换行为 CRLF，并保证以 CRLF 结尾
pub fn normalize_banner(text: &str) -> String {
    let mut banner = text.replace("\r\n", "\n").replace('\n', "\r\n");
    if !banner.ends_with("\r\n") {
        banner.push_str("\r\n");
    }
    banner
}

/// 注册到传输层的认证回调集合
///
/// 某种认证方式未启用时对应回调为 None（而不是一个总是拒绝的回调）；
/// 未配置横幅时不发送横幅。
pub struct AuthCallbacks {
    pub password: Option<PasswordCallback>,
    pub public_key: Option<PublicKeyCallback>,
    pub banner: Option<String>,
    /// 允许 none 方法
    pub no_auth: bool,
}

impl AuthCallbacks {
    pub fn new(config: &Config, logger: Arc<AuditLogger>) -> Self {
        let password = enabled(config.auth.password_auth).map(|accepted| PasswordCallback {
            accepted,
            logger: logger.clone(),
        });
        let public_key =
            enabled(config.auth.public_key_auth).map(|accepted| PublicKeyCallback {
                accepted,
                logger: logger.clone(),
            });
        let banner = (!config.ssh_proto.banner.is_empty())
            .then(|| normalize_banner(&config.ssh_proto.banner));

        Self {
            password,
            public_key,
            banner,
            no_auth: config.auth.no_auth,
        }
    }
}

fn enabled(policy: CommonAuthPolicy) -> Option<bool> {
    policy.enabled.then_some(policy.accepted)
}
