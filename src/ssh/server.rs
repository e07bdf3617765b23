// SSH 蜜罐服务端
// 监听 TCP 端口，每个连接在独立任务中运行 russh 会话

use std::sync::Arc;
use std::time::Duration;

use russh::keys::PrivateKey;
use tokio::net::TcpListener;

use super::auth::AuthCallbacks;
use super::config::to_russh_config;
use super::error::HoneypotError;
use super::handler::HoneypotHandler;
use super::logger::AuditLogger;
use crate::models::Config;

/// accept 失败后的退避时间
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// 蜜罐服务端
pub struct HoneypotServer {
    listen_address: String,
    russh_config: Arc<russh::server::Config>,
    callbacks: Arc<AuthCallbacks>,
    logger: Arc<AuditLogger>,
}

impl HoneypotServer {
    pub fn new(config: &Config, host_keys: Vec<PrivateKey>, logger: Arc<AuditLogger>) -> Self {
        Self {
            listen_address: config.server.listen_address.clone(),
            russh_config: Arc::new(to_russh_config(config, host_keys)),
            callbacks: Arc::new(AuthCallbacks::new(config, logger.clone())),
            logger,
        }
    }

    /// 监听并处理连接，直到监听失败
    pub async fn run(&self) -> Result<(), HoneypotError> {
        let listener = TcpListener::bind(&self.listen_address).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let source = peer.to_string();
            tracing::debug!("[{}] Connection accepted", source);

            let handler =
                HoneypotHandler::new(source.clone(), self.callbacks.clone(), self.logger.clone());
            let russh_config = self.russh_config.clone();

            tokio::spawn(async move {
                let session = match russh::server::run_stream(russh_config, stream, handler).await
                {
                    Ok(session) => session,
                    Err(e) => {
                        tracing::debug!("[{}] Handshake failed: {:?}", source, e);
                        return;
                    }
                };
                if let Err(e) = session.await {
                    tracing::debug!("[{}] Connection ended with error: {:?}", source, e);
                }
                tracing::debug!("[{}] Connection closed", source);
            });
        }
    }
}
