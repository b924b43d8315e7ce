//! Host-facing façade over the link service.
//!
//! The broker never touches service state directly: every operation is a
//! command to the service thread, and state is read from the session the
//! service publishes.

use crate::config::LinkConfig;
use crate::error::link::LinkError;
use crate::link::channel::CallHandler;
use crate::link::handle::ServiceHandle;
use crate::link::launch::{LaunchedWorker, spawn_worker};
use crate::link::service::{ServiceCommand, spawn_service};
use crate::token;

use models::{LinkEvent, LinkSession, LinkState, Token};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::spawn_blocking as TokioSpawnBlocking;
use tokio::time::timeout as TokioTimeout;

pub struct LinkBroker {
    config: LinkConfig,
    service: ServiceHandle,
}

impl LinkBroker {
    /// Spawn the service thread. The service starts out stopped.
    ///
    /// `host_handler` answers the calls workers make into the host.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] if the service thread cannot be created.
    pub fn new(config: LinkConfig, host_handler: Arc<dyn CallHandler>) -> Result<Self, LinkError> {
        let service = spawn_service(config.service.clone(), host_handler)?;
        Ok(Self { config, service })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Receiver for link events. Every `ApprovalRequested` must be answered
    /// with [`LinkBroker::approve`] or [`LinkBroker::deny`].
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.service.subscribe()
    }

    /// Ask the service to start listening. A no-op if it already is.
    pub fn start_link(&self) -> Result<(), LinkError> {
        info!("Starting link service");
        self.service.send(ServiceCommand::Start)
    }

    /// Ask the service to stop. A no-op if it is not running.
    pub fn stop_link(&self) -> Result<(), LinkError> {
        info!("Stopping link service");
        self.service.send(ServiceCommand::Stop)
    }

    pub fn session(&self) -> LinkSession {
        self.service.session()
    }

    pub fn port(&self) -> Option<u16> {
        self.session().port
    }

    pub fn is_running(&self) -> bool {
        self.session().is_listening()
    }

    /// Start the service if needed and wait for it to listen, using the
    /// configured attempt count and interval.
    pub async fn ensure_running(&self) -> bool {
        self.ensure_running_with(
            self.config.broker.ensure_attempts,
            self.config.broker.ensure_interval(),
        )
        .await
    }

    /// Start the service if needed and poll up to `attempts` times, `interval`
    /// apart, for it to reach `Listening`.
    pub async fn ensure_running_with(&self, attempts: u32, interval: Duration) -> bool {
        if self.is_running() {
            return true;
        }

        let mut session = self.service.session_watch();

        for attempt in 1..=attempts {
            if self.session().state == LinkState::Stopped {
                if let Err(e) = self.start_link() {
                    error!("Cannot start link service: {}", e);
                    return false;
                }
            }

            let listening = matches!(
                TokioTimeout(interval, session.wait_for(LinkSession::is_listening)).await,
                Ok(Ok(_))
            );
            if listening {
                return true;
            }

            debug!(
                "Link service not listening yet (attempt {}/{})",
                attempt, attempts
            );
        }

        warn!("Link service failed to start after {} attempts", attempts);
        false
    }

    /// Approve the pending pairing of `process_id`.
    ///
    /// A fresh secret is minted for the worker; the service trusts it and
    /// hands it back during the handshake.
    ///
    /// # Returns
    ///
    /// The minted token, or `None` if no approval was pending for `process_id`.
    pub async fn approve(&self, process_id: &str) -> Result<Option<Token>, LinkError> {
        let minted = token::mint(process_id)?;
        let offered = minted.clone();

        let accepted = self
            .service
            .request(move |reply| ServiceCommand::Approve {
                token: offered,
                reply,
            })
            .await?;

        Ok(accepted.then_some(minted))
    }

    /// Deny the pending pairing of `process_id`. Returns whether anything was
    /// pending.
    pub async fn deny(&self, process_id: &str) -> Result<bool, LinkError> {
        let process_id = process_id.to_string();
        self.service
            .request(move |reply| ServiceCommand::Deny { process_id, reply })
            .await
    }

    /// Launch a worker process connected to this host.
    ///
    /// With `auto_pair` the worker receives a pre-authorized token and skips
    /// interactive approval; without it the worker presents a placeholder.
    ///
    /// # Errors
    ///
    /// - [`LinkError::WorkerExecutableMissing`] if no worker is configured or it
    ///   cannot be found
    /// - [`LinkError::ServiceUnavailable`] if the service will not start
    /// - [`LinkError::Spawn`] if the process fails to start
    pub async fn launch_worker(&self, auto_pair: bool) -> Result<LaunchedWorker, LinkError> {
        if self.config.launcher.executable.is_none() {
            return Err(LinkError::worker_executable_missing(
                "no worker executable configured",
            ));
        }

        if !self.ensure_running().await {
            return Err(LinkError::service_unavailable(
                "link service is not listening",
            ));
        }

        let port = self
            .port()
            .ok_or_else(|| LinkError::service_unavailable("link service has no port"))?;

        let token = if auto_pair {
            Some(
                self.service
                    .request(|reply| ServiceCommand::Pair { reply })
                    .await??,
            )
        } else {
            None
        };

        match spawn_worker(&self.config.launcher, port, token.as_ref()) {
            Ok(child) => Ok(LaunchedWorker { token, child }),
            Err(e) => {
                if let Some(ref token) = token {
                    warn!(
                        "Revoking pre-authorization of worker {} after failed launch",
                        token.process_id()
                    );
                    let _ = self.disconnect_worker(token.process_id()).await;
                }
                Err(e)
            }
        }
    }

    /// Process ids currently trusted by the service.
    pub async fn paired_workers(&self) -> Result<Vec<String>, LinkError> {
        self.service
            .request(|reply| ServiceCommand::PairedWorkers { reply })
            .await
    }

    /// Process ids with a live connection.
    pub async fn connected_workers(&self) -> Result<Vec<String>, LinkError> {
        self.service
            .request(|reply| ServiceCommand::ConnectedWorkers { reply })
            .await
    }

    /// Forget `process_id` and close its connection. Returns whether it was
    /// paired.
    pub async fn disconnect_worker(&self, process_id: &str) -> Result<bool, LinkError> {
        let process_id = process_id.to_string();
        self.service
            .request(move |reply| ServiceCommand::Revoke { process_id, reply })
            .await
    }

    /// Call `method` on a connected worker.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ChannelClosed`] if the worker is not connected.
    pub async fn call_worker(
        &self,
        process_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, LinkError> {
        let id = process_id.to_string();
        let channel = self
            .service
            .request(move |reply| ServiceCommand::Channel {
                process_id: id,
                reply,
            })
            .await?
            .ok_or_else(LinkError::channel_closed)?;

        channel
            .call(method, params, self.config.client.call_timeout())
            .await
    }

    /// Stop the service and wait for its thread to exit.
    pub async fn shutdown(self) {
        let mut service = self.service;
        if TokioSpawnBlocking(move || service.join()).await.is_err() {
            error!("Link service shutdown task failed");
        }
        info!("Link broker shut down");
    }
}
