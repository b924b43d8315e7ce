//! Worker-side link client.
//!
//! Runs inside a worker process. Finds the service port and a token, performs
//! the client half of the handshake and keeps the resulting [`CallChannel`].

use crate::config::ClientConfig;
use crate::error::link::LinkError;
use crate::link::channel::{CallChannel, CallHandler};
use crate::link::handshake::{read_token, write_token};
use crate::registry::PortRegistry;
use crate::token;
use crate::{ENV_LINK_PORT, ENV_LINK_TOKEN, LINK_BIND_ADDRESS};

use models::Token;

use std::env;
use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout as TokioTimeout;

pub struct WorkerClient {
    config: ClientConfig,
    registry: PortRegistry,
    handler: Arc<dyn CallHandler>,
    token: Option<Token>,
    port: Option<u16>,
    channel: Option<CallChannel>,
}

impl WorkerClient {
    /// `handler` answers the calls the host makes into this worker.
    pub fn new(config: ClientConfig, registry: PortRegistry, handler: Arc<dyn CallHandler>) -> Self {
        Self {
            config,
            registry,
            handler,
            token: None,
            port: None,
            channel: None,
        }
    }

    /// Connect to the link service.
    ///
    /// Missing arguments are resolved in order:
    /// - port: `BLENDER_LINK_PORT`, then the port record
    /// - token: the token adopted on a previous connect, then
    ///   `BLENDER_LINK_TOKEN`, then a placeholder (which waits for host approval)
    ///
    /// If a connect with a real token fails for any reason it is retried once
    /// with a placeholder for the same process id.
    ///
    /// # Errors
    ///
    /// - [`LinkError::ServiceUnavailable`] if no port can be found
    /// - [`LinkError::Io`] / [`LinkError::Timeout`] if the service is unreachable
    /// - [`LinkError::AuthenticationFailed`] if the handshake is rejected
    pub async fn connect(&mut self, port: Option<u16>, token: Option<Token>) -> Result<(), LinkError> {
        self.disconnect();

        let port = match port {
            Some(port) => port,
            None => self.resolve_port()?,
        };

        let token = match token {
            Some(token) => token,
            None => self.resolve_token()?,
        };

        match self.handshake(port, &token).await {
            Ok(()) => Ok(()),
            Err(e) if !token.is_placeholder() => {
                warn!(
                    "Connect as worker {} failed ({}), retrying with a placeholder",
                    token.process_id(),
                    e.error_category()
                );
                let placeholder = token::placeholder_token(token.process_id())?;
                self.handshake(port, &placeholder).await
            }
            Err(e) => Err(e),
        }
    }

    /// Close the connection. Safe to call when not connected.
    pub fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
            info!("Disconnected from link service");
        }
        self.port = None;
    }

    /// Probe the connection. A dead connection is cleaned up.
    pub async fn is_connected(&mut self) -> bool {
        let Some(channel) = self.channel.as_ref() else {
            return false;
        };

        if !channel.is_closed() && channel.ping(self.config.call_timeout()).await {
            return true;
        }

        debug!("Link connection is gone, cleaning up");
        self.disconnect();
        false
    }

    /// Call `method` on the host.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ChannelClosed`] if not connected.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, LinkError> {
        let channel = self.channel.as_ref().ok_or_else(LinkError::channel_closed)?;
        channel
            .call(method, params, self.config.call_timeout())
            .await
    }

    /// The token adopted on the last successful connect.
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    fn resolve_port(&self) -> Result<u16, LinkError> {
        if let Ok(value) = env::var(ENV_LINK_PORT) {
            match value.trim().parse::<u16>() {
                Ok(port) => return Ok(port),
                Err(e) => warn!("Ignoring invalid {}='{}': {}", ENV_LINK_PORT, value, e),
            }
        }

        match self.registry.read() {
            Ok(Some(port)) => Ok(port),
            Ok(None) => Err(LinkError::service_unavailable(
                "link service is not running (no port recorded)",
            )),
            Err(e) => Err(LinkError::service_unavailable(format!(
                "cannot read port record: {e}"
            ))),
        }
    }

    fn resolve_token(&self) -> Result<Token, LinkError> {
        // The environment only seeds the first connect; approval may have
        // replaced that secret since.
        if let Some(ref token) = self.token {
            return Ok(token.clone());
        }

        if let Ok(value) = env::var(ENV_LINK_TOKEN) {
            match token::parse(value.trim()) {
                Ok(token) => return Ok(token),
                Err(e) => warn!("Ignoring invalid {}: {}", ENV_LINK_TOKEN, e),
            }
        }

        token::own_placeholder_token()
    }

    async fn handshake(&mut self, port: u16, token: &Token) -> Result<(), LinkError> {
        let address = format!("{LINK_BIND_ADDRESS}{port}");
        debug!("Connecting to link service at {}", address);

        let mut stream = TokioTimeout(self.config.connect_timeout(), TcpStream::connect(&address))
            .await
            .map_err(|_| LinkError::timeout(format!("connecting to {address} timed out")))??;

        if token.is_placeholder() {
            info!(
                "Requesting pairing as worker {}, waiting for host approval",
                token.process_id()
            );
        }

        write_token(&mut stream, &token::encode_token(token)).await?;

        let reply = read_token(&mut stream, self.config.response_timeout())
            .await
            .map_err(|e| match e {
                LinkError::AuthenticationFailed { message, .. } => {
                    LinkError::authentication_failed(token.process_id(), message)
                }
                other => other,
            })?;

        let adopted = token::parse(&reply)?;
        if adopted.process_id() != token.process_id() || adopted.is_placeholder() {
            return Err(LinkError::protocol(format!(
                "service answered worker {} with an unexpected token",
                token.process_id()
            )));
        }

        let channel = CallChannel::open(stream, Arc::clone(&self.handler), |channel_id| {
            debug!("Link channel {} to host closed", channel_id);
        });

        info!("Connected to link service on port {} as worker {}", port, adopted.process_id());

        self.channel = Some(channel);
        self.token = Some(adopted);
        self.port = Some(port);
        Ok(())
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }
}
