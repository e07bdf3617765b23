// SSH 服务端 Handler 实现
// 实现 russh::server::Handler trait，只做转发：决策交给 AuthCallbacks，记录交给 SessionRecorder

use std::collections::HashSet;
use std::sync::Arc;

use russh::keys::ssh_key::Certificate;
use russh::keys::PublicKey;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, Pty, Sig};

use super::auth::{fingerprint, AuthCallbacks, AuthOutcome};
use super::error::HoneypotError;
use super::event::LogEvent;
use super::logger::AuditLogger;
use super::session::{escape_input, SessionRecorder};

/// 拒绝本次认证，允许客户端继续尝试其他方式
fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: None,
        partial_success: false,
    }
}

fn to_auth(outcome: AuthOutcome) -> Auth {
    if outcome.is_accepted() {
        Auth::Accept
    } else {
        reject()
    }
}

/// 回复通道请求
fn reply(session: &mut Session, channel: ChannelId, accepted: bool) {
    // 客户端可能已断开，回复失败不影响连接任务
    let _ = if accepted {
        session.channel_success(channel)
    } else {
        session.channel_failure(channel)
    };
}

/// 蜜罐 Handler，每个连接一个实例
pub struct HoneypotHandler {
    callbacks: Arc<AuthCallbacks>,
    recorder: SessionRecorder<ChannelId>,
    /// 本连接已记录过的 (用户名, 公钥指纹)
    offered_keys: HashSet<(String, String)>,
}

impl HoneypotHandler {
    pub fn new(source: String, callbacks: Arc<AuthCallbacks>, logger: Arc<AuditLogger>) -> Self {
        Self {
            callbacks,
            recorder: SessionRecorder::new(source, logger),
            offered_keys: HashSet::new(),
        }
    }

    /// 公钥决策：同一用户名下的同一把公钥在一个连接内只记录一次
    fn check_public_key(&mut self, user: &str, public_key: &PublicKey) -> Auth {
        let Some(callback) = self.callbacks.public_key.as_ref() else {
            return reject();
        };
        if !self
            .offered_keys
            .insert((user.to_string(), fingerprint(public_key)))
        {
            return to_auth(callback.decision());
        }
        to_auth(callback.check(self.recorder.source(), user, public_key))
    }
}

impl russh::server::Handler for HoneypotHandler {
    type Error = HoneypotError;

    async fn auth_none(&mut self, _user: &str) -> Result<Auth, Self::Error> {
        Ok(if self.callbacks.no_auth {
            Auth::Accept
        } else {
            reject()
        })
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        Ok(match self.callbacks.password.as_ref() {
            Some(callback) => to_auth(callback.check(self.recorder.source(), user, password)),
            None => reject(),
        })
    }

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.check_public_key(user, public_key))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.check_public_key(user, public_key))
    }

    async fn auth_openssh_certificate(
        &mut self,
        user: &str,
        certificate: &Certificate,
    ) -> Result<Auth, Self::Error> {
        // 证书按其中的公钥记录
        let public_key = PublicKey::from(certificate.public_key().clone());
        Ok(self.check_public_key(user, &public_key))
    }

    async fn authentication_banner(&mut self) -> Result<Option<String>, Self::Error> {
        Ok(self.callbacks.banner.clone())
    }

    async fn auth_succeeded(&mut self, session: &mut Session) -> Result<(), Self::Error> {
        let client_version = String::from_utf8_lossy(session.remote_sshid()).into_owned();
        self.recorder.connection_established(client_version);
        Ok(())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.recorder.open_session(channel.id());
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.recorder.open_direct_tcpip(
            channel.id(),
            format!("{}:{}", originator_address, originator_port),
            format!("{}:{}", host_to_connect, port_to_connect),
        );
        Ok(true)
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.recorder.unsupported_channel(
            "x11",
            format!("{}:{}", originator_address, originator_port),
        );
        Ok(false)
    }

    async fn channel_open_forwarded_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.recorder.unsupported_channel(
            "forwarded-tcpip",
            format!(
                "{}:{} -> {}:{}",
                originator_address, originator_port, host_to_connect, port_to_connect
            ),
        );
        Ok(false)
    }

    async fn channel_open_direct_streamlocal(
        &mut self,
        _channel: Channel<Msg>,
        socket_path: &str,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.recorder.unsupported_channel(
            "direct-streamlocal@openssh.com",
            socket_path.to_string(),
        );
        Ok(false)
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.recorder.close(channel);
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.recorder.input(channel, data);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = format!(
            "{} {}x{} ({}x{} px)",
            term, col_width, row_height, pix_width, pix_height
        );
        let accepted = self
            .recorder
            .channel_request(channel, "pty-req", payload, |channel_id| {
                Some(LogEvent::Pty {
                    channel_id,
                    terminal: term.to_string(),
                    width: col_width,
                    height: row_height,
                })
            });
        reply(session, channel, accepted);
        Ok(())
    }

    async fn x11_request(
        &mut self,
        channel: ChannelId,
        single_connection: bool,
        x11_auth_protocol: &str,
        x11_auth_cookie: &str,
        x11_screen_number: u32,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = format!(
            "single_connection={} protocol={} cookie={} screen={}",
            single_connection, x11_auth_protocol, x11_auth_cookie, x11_screen_number
        );
        let accepted = self
            .recorder
            .channel_request(channel, "x11-req", payload, |channel_id| {
                Some(LogEvent::X11 {
                    channel_id,
                    screen: x11_screen_number,
                })
            });
        reply(session, channel, accepted);
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = format!("{}={}", variable_name, variable_value);
        let accepted = self
            .recorder
            .channel_request(channel, "env", payload, |channel_id| {
                Some(LogEvent::Env {
                    channel_id,
                    name: variable_name.to_string(),
                    value: variable_value.to_string(),
                })
            });
        reply(session, channel, accepted);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let accepted = self
            .recorder
            .channel_request(channel, "shell", String::new(), |channel_id| {
                Some(LogEvent::Shell { channel_id })
            });
        reply(session, channel, accepted);
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = escape_input(data);
        let accepted =
            self.recorder
                .channel_request(channel, "exec", command.clone(), |channel_id| {
                    Some(LogEvent::Exec {
                        channel_id,
                        command,
                    })
                });
        reply(session, channel, accepted);
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let accepted = self
            .recorder
            .channel_request(channel, "subsystem", name.to_string(), |channel_id| {
                Some(LogEvent::Subsystem {
                    channel_id,
                    subsystem: name.to_string(),
                })
            });
        reply(session, channel, accepted);
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = format!(
            "{}x{} ({}x{} px)",
            col_width, row_height, pix_width, pix_height
        );
        let accepted =
            self.recorder
                .channel_request(channel, "window-change", payload, |channel_id| {
                    Some(LogEvent::WindowChange {
                        channel_id,
                        width: col_width,
                        height: row_height,
                    })
                });
        reply(session, channel, accepted);
        Ok(())
    }

    async fn signal(
        &mut self,
        channel: ChannelId,
        signal: Sig,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        // 信号只在 debug 模式下可见
        self.recorder
            .channel_request(channel, "signal", format!("{:?}", signal), |_| None);
        Ok(())
    }

    async fn agent_request(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.recorder.channel_request(
            channel,
            "auth-agent-req@openssh.com",
            String::new(),
            |_| None,
        );
        Ok(false)
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let address = format!("{}:{}", address, port);
        self.recorder.global_request(
            "tcpip-forward",
            address.clone(),
            Some(LogEvent::TcpipForward { address }),
        );
        Ok(true)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let address = format!("{}:{}", address, port);
        self.recorder.global_request(
            "cancel-tcpip-forward",
            address.clone(),
            Some(LogEvent::CancelTcpipForward { address }),
        );
        Ok(true)
    }

    async fn streamlocal_forward(
        &mut self,
        socket_path: &str,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.recorder.global_request(
            "streamlocal-forward@openssh.com",
            socket_path.to_string(),
            None,
        );
        Ok(false)
    }

    async fn cancel_streamlocal_forward(
        &mut self,
        socket_path: &str,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.recorder.global_request(
            "cancel-streamlocal-forward@openssh.com",
            socket_path.to_string(),
            None,
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    use russh::client::AuthResult;
    use russh::{ChannelMsg, Disconnect, SshId};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use crate::models::{Config, LoggingConfig};
    use crate::services::host_keys::tests::ED25519_KEY;
    use crate::ssh::auth::tests::{json_logger, read_events, ED25519_FINGERPRINT, ED25519_PUBLIC};
    use crate::ssh::config::to_russh_config;

    const SOURCE: &str = "203.0.113.9:60001";
    const CLIENT_VERSION: &str = "SSH-2.0-OpenSSH_9.6p1";

    fn handler(config: &Config, logger: Arc<AuditLogger>) -> HoneypotHandler {
        let callbacks = Arc::new(AuthCallbacks::new(config, logger.clone()));
        HoneypotHandler::new(SOURCE.into(), callbacks, logger)
    }

    /// 测试客户端：接受任意主机密钥，保存收到的横幅
    struct TestClient {
        banner: Arc<Mutex<Option<String>>>,
    }

    impl russh::client::Handler for TestClient {
        type Error = russh::Error;

        async fn check_server_key(&mut self, _key: &PublicKey) -> Result<bool, Self::Error> {
            Ok(true)
        }

        async fn auth_banner(
            &mut self,
            banner: &str,
            _session: &mut russh::client::Session,
        ) -> Result<(), Self::Error> {
            *self.banner.lock().unwrap() = Some(banner.to_string());
            Ok(())
        }
    }

    /// 在回环地址上接受一个连接并运行蜜罐会话
    async fn serve_once(config: &Config, logger: Arc<AuditLogger>) -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let host_key = russh::keys::decode_secret_key(ED25519_KEY, None).unwrap();
        let russh_config = Arc::new(to_russh_config(config, vec![host_key]));
        let callbacks = Arc::new(AuthCallbacks::new(config, logger.clone()));

        let task = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let handler = HoneypotHandler::new(peer.to_string(), callbacks, logger);
            let session = russh::server::run_stream(russh_config, stream, handler)
                .await
                .unwrap();
            let _ = session.await;
        });
        (addr, task)
    }

    async fn connect(
        addr: SocketAddr,
        banner: Arc<Mutex<Option<String>>>,
    ) -> russh::client::Handle<TestClient> {
        let config = russh::client::Config {
            client_id: SshId::Standard(CLIENT_VERSION.to_string()),
            ..Default::default()
        };
        russh::client::connect(Arc::new(config), addr, TestClient { banner })
            .await
            .unwrap()
    }

    /// 等待通道请求的回复，返回是否成功
    async fn wait_reply(channel: &mut Channel<russh::client::Msg>) -> bool {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Success) => return true,
                Some(ChannelMsg::Failure) => return false,
                Some(_) => continue,
                None => panic!("channel closed before reply"),
            }
        }
    }

    /// 断开连接并等待服务端会话结束
    async fn finish(client: russh::client::Handle<TestClient>, server: JoinHandle<()>) {
        let _ = client
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        drop(client);
        tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("server session did not finish")
            .unwrap();
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    /// 断言前缀事件完全一致，其后依次为通道关闭与 connection_close
    fn assert_session_events(events: &[LogEvent], expected: &[LogEvent], closed: &[LogEvent]) {
        assert_eq!(&events[..expected.len()], expected);
        let tail = &events[expected.len()..];
        assert_eq!(tail.len(), closed.len() + 1, "unexpected tail: {:?}", tail);
        for event in closed {
            assert!(tail.contains(event), "missing {:?} in {:?}", event, tail);
        }
        assert_eq!(tail.last(), Some(&LogEvent::ConnectionClose {}));
    }

    #[test]
    fn test_password_session_over_loopback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let banner = Arc::new(Mutex::new(None));

        runtime().block_on(async {
            let (addr, server) = serve_once(&Config::default(), json_logger(&path)).await;
            let mut client = connect(addr, banner.clone()).await;

            let auth = client
                .authenticate_password("root", "hunter2")
                .await
                .unwrap();
            assert!(matches!(auth, AuthResult::Success));

            let mut shell = client.channel_open_session().await.unwrap();
            shell
                .request_pty(true, "xterm-256color", 120, 40, 0, 0, &[])
                .await
                .unwrap();
            assert!(wait_reply(&mut shell).await);
            shell.request_shell(true).await.unwrap();
            assert!(wait_reply(&mut shell).await);
            shell.data(&b"cat /etc/shadow\r"[..]).await.unwrap();

            let mut exec = client.channel_open_session().await.unwrap();
            exec.exec(true, "uname -a").await.unwrap();
            assert!(wait_reply(&mut exec).await);

            finish(client, server).await;
        });

        assert_eq!(
            banner.lock().unwrap().as_deref(),
            Some("This is an SSH honeypot. Everything is logged and monitored.\r\n")
        );
        assert_session_events(
            &read_events(&path),
            &[
                LogEvent::PasswordAuth {
                    user: "root".into(),
                    accepted: true,
                    password: "hunter2".into(),
                },
                LogEvent::Connection {
                    client_version: CLIENT_VERSION.into(),
                },
                LogEvent::Session { channel_id: 0 },
                LogEvent::Pty {
                    channel_id: 0,
                    terminal: "xterm-256color".into(),
                    width: 120,
                    height: 40,
                },
                LogEvent::Shell { channel_id: 0 },
                LogEvent::SessionInput {
                    channel_id: 0,
                    input: "cat /etc/shadow\r".into(),
                },
                LogEvent::Session { channel_id: 1 },
                LogEvent::Exec {
                    channel_id: 1,
                    command: "uname -a".into(),
                },
            ],
            &[
                LogEvent::SessionClose { channel_id: 0 },
                LogEvent::SessionClose { channel_id: 1 },
            ],
        );
    }

    #[test]
    fn test_forwarding_and_no_auth_over_loopback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let banner = Arc::new(Mutex::new(None));
        let mut config = Config::default();
        config.auth.no_auth = true;
        config.auth.password_auth.accepted = false;
        config.auth.public_key_auth.enabled = false;
        config.ssh_proto.banner = String::new();

        runtime().block_on(async {
            let (addr, server) = serve_once(&config, json_logger(&path)).await;
            let mut client = connect(addr, banner.clone()).await;

            let auth = client.authenticate_password("admin", "admin").await.unwrap();
            assert!(matches!(auth, AuthResult::Failure { .. }));
            let auth = client.authenticate_none("admin").await.unwrap();
            assert!(matches!(auth, AuthResult::Success));

            client.tcpip_forward("0.0.0.0", 8080).await.unwrap();

            // 转发通道上的 shell 请求被拒绝
            let mut tunnel = client
                .channel_open_direct_tcpip("10.0.0.1", 22, "127.0.0.1", 5555)
                .await
                .unwrap();
            tunnel.request_shell(true).await.unwrap();
            assert!(!wait_reply(&mut tunnel).await);

            let mut exec = client.channel_open_session().await.unwrap();
            exec.exec(true, b"echo \xff".to_vec()).await.unwrap();
            assert!(wait_reply(&mut exec).await);

            finish(client, server).await;
        });

        assert!(banner.lock().unwrap().is_none());
        assert_session_events(
            &read_events(&path),
            &[
                LogEvent::PasswordAuth {
                    user: "admin".into(),
                    accepted: false,
                    password: "admin".into(),
                },
                LogEvent::Connection {
                    client_version: CLIENT_VERSION.into(),
                },
                LogEvent::TcpipForward {
                    address: "0.0.0.0:8080".into(),
                },
                LogEvent::DirectTcpip {
                    channel_id: 0,
                    from: "127.0.0.1:5555".into(),
                    to: "10.0.0.1:22".into(),
                },
                LogEvent::Session { channel_id: 1 },
                LogEvent::Exec {
                    channel_id: 1,
                    command: "echo \\xff".into(),
                },
            ],
            &[
                LogEvent::DirectTcpipClose { channel_id: 0 },
                LogEvent::SessionClose { channel_id: 1 },
            ],
        );
    }

    #[test]
    fn test_unsupported_requests_logged_in_debug_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let logger = Arc::new(
            AuditLogger::from_config(&LoggingConfig {
                file: Some(path.to_string_lossy().into_owned()),
                json: true,
                timestamps: false,
                debug: true,
            })
            .unwrap(),
        );

        runtime().block_on(async {
            let (addr, server) = serve_once(&Config::default(), logger).await;
            let mut client = connect(addr, Arc::new(Mutex::new(None))).await;
            let auth = client.authenticate_password("root", "root").await.unwrap();
            assert!(matches!(auth, AuthResult::Success));

            let _ = client.streamlocal_forward("/tmp/agent.sock").await;
            assert!(client
                .channel_open_direct_streamlocal("/run/docker.sock")
                .await
                .is_err());
            let session = client.channel_open_session().await.unwrap();

            finish(client, server).await;
            drop(session);
        });

        let events = read_events(&path);
        assert!(events.contains(&LogEvent::DebugGlobalRequest {
            request_type: "streamlocal-forward@openssh.com".into(),
            want_reply: true,
            payload: "/tmp/agent.sock".into(),
        }));
        assert!(events.contains(&LogEvent::DebugChannel {
            channel_id: 0,
            channel_type: "direct-streamlocal@openssh.com".into(),
            extra_data: "/run/docker.sock".into(),
        }));
        // 被拒绝的通道占用编号 0，之后的 session 为 1
        assert!(events.contains(&LogEvent::Session { channel_id: 1 }));
        assert!(!events
            .iter()
            .any(|event| matches!(event, LogEvent::SessionClose { channel_id: 0 })));
    }

    #[test]
    fn test_same_key_logged_for_each_user() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let mut handler = handler(&Config::default(), json_logger(&path));
        let key = PublicKey::from_openssh(ED25519_PUBLIC).unwrap();

        for user in ["root", "admin", "oracle", "root"] {
            assert!(matches!(
                handler.check_public_key(user, &key),
                Auth::Reject { .. }
            ));
        }

        let users: Vec<String> = read_events(&path)
            .into_iter()
            .map(|event| match event {
                LogEvent::PublicKeyAuth {
                    user, public_key, ..
                } => {
                    assert_eq!(public_key, ED25519_FINGERPRINT);
                    user
                }
                other => panic!("unexpected event: {:?}", other),
            })
            .collect();
        assert_eq!(users, vec!["root", "admin", "oracle"]);
    }

    #[test]
    fn test_public_key_logged_once_per_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let mut config = Config::default();
        config.auth.public_key_auth.accepted = true;
        let mut handler = handler(&config, json_logger(&path));
        let key = PublicKey::from_openssh(ED25519_PUBLIC).unwrap();

        // 先探测公钥，再携带签名认证
        assert!(matches!(handler.check_public_key("git", &key), Auth::Accept));
        assert!(matches!(handler.check_public_key("git", &key), Auth::Accept));

        assert_eq!(
            read_events(&path),
            vec![LogEvent::PublicKeyAuth {
                user: "git".into(),
                accepted: true,
                public_key: ED25519_FINGERPRINT.into(),
            }]
        );
    }

    #[test]
    fn test_disabled_public_key_rejected_silently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let mut config = Config::default();
        config.auth.public_key_auth.enabled = false;
        let mut handler = handler(&config, json_logger(&path));
        let key = PublicKey::from_openssh(ED25519_PUBLIC).unwrap();

        assert!(matches!(
            handler.check_public_key("root", &key),
            Auth::Reject { .. }
        ));
        drop(handler);
        assert!(read_events(&path).is_empty());
    }
}
