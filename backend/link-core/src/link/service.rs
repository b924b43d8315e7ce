//! Link service: listening endpoint, accept loop and per-connection handshake.
//!
//! The service is an actor running on its own OS thread (with a
//! current-thread tokio runtime). It exclusively owns the listener, the
//! [`AuthTable`], the pending approval and the live connections. Other
//! threads reach it only through [`ServiceCommand`]s, and observe it through
//! the published [`LinkSession`] and broadcast [`LinkEvent`]s.
//!
//! # Handshake
//!
//! 1. Read exactly `TOKEN_LENGTH` bytes and decode them
//! 2. Placeholder secret: raise `ApprovalRequested` and wait for approve/deny
//!    while still serving other commands
//! 3. Check the token against the auth table
//! 4. Write the adopted token back and open a [`CallChannel`]
//!
//! Handshakes run one at a time, so auth table updates need no lock. Any
//! failure closes that connection only; the accept loop keeps going.

use crate::LINK_BIND_ADDRESS;
use crate::config::ServiceConfig;
use crate::error::link::LinkError;
use crate::link::auth_table::AuthTable;
use crate::link::channel::{CallChannel, CallHandler};
use crate::link::handle::ServiceHandle;
use crate::link::handshake::{read_token, write_token};
use crate::registry::PortRegistry;
use crate::token;

use models::{LinkEvent, LinkSession, Token};

use std::collections::HashMap;
use std::future::pending as pending_forever;
use std::io::Result as IoResult;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep as TokioSleep, sleep_until as TokioSleepUntil};

const SERVICE_THREAD_NAME: &str = "blender-link-service";
const EVENT_CAPACITY: usize = 64;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Messages into the service actor.
pub(crate) enum ServiceCommand {
    Start,
    Stop,
    /// Mint a fresh process id and secret and trust them before the worker
    /// ever connects.
    Pair {
        reply: oneshot::Sender<Result<Token, LinkError>>,
    },
    /// Resolve the pending approval for `token.process_id()` with `token`.
    Approve {
        token: Token,
        reply: oneshot::Sender<bool>,
    },
    Deny {
        process_id: String,
        reply: oneshot::Sender<bool>,
    },
    /// Forget a worker and close its connection.
    Revoke {
        process_id: String,
        reply: oneshot::Sender<bool>,
    },
    PairedWorkers {
        reply: oneshot::Sender<Vec<String>>,
    },
    ConnectedWorkers {
        reply: oneshot::Sender<Vec<String>>,
    },
    Channel {
        process_id: String,
        reply: oneshot::Sender<Option<CallChannel>>,
    },
    ChannelClosed {
        process_id: String,
        channel_id: u64,
    },
    Shutdown,
}

enum Decision {
    Approved(Token),
    Denied,
}

/// An unrecognized worker waiting on the host's approve/deny.
struct PendingApproval {
    request_id: String,
    decision: Option<Decision>,
}

enum ApprovalWake {
    Command(Option<ServiceCommand>),
    TimedOut,
    PeerGone,
}

enum Wake {
    Command(Option<ServiceCommand>),
    Accepted(IoResult<(TcpStream, SocketAddr)>),
}

pub(crate) struct LinkService {
    config: ServiceConfig,
    registry: PortRegistry,
    handler: Arc<dyn CallHandler>,
    events: broadcast::Sender<LinkEvent>,
    session: watch::Sender<LinkSession>,
    commands: mpsc::UnboundedSender<ServiceCommand>,
    listener: Option<TcpListener>,
    auth_table: AuthTable,
    pending: Option<PendingApproval>,
    connections: HashMap<String, CallChannel>,
    deferred: Option<ServiceCommand>,
}

/// Start the service thread. The service begins in the `Stopped` state.
///
/// # Errors
///
/// Returns [`LinkError::Io`] if the runtime or the thread cannot be created.
pub(crate) fn spawn_service(
    config: ServiceConfig,
    handler: Arc<dyn CallHandler>,
) -> Result<ServiceHandle, LinkError> {
    let registry = config.registry();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (session_tx, session_rx) = watch::channel(LinkSession::stopped());
    let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let service = LinkService {
        config,
        registry,
        handler,
        events: events_tx.clone(),
        session: session_tx,
        commands: command_tx.clone(),
        listener: None,
        auth_table: AuthTable::new(),
        pending: None,
        connections: HashMap::new(),
        deferred: None,
    };

    let thread = std::thread::Builder::new()
        .name(SERVICE_THREAD_NAME.to_string())
        .spawn(move || runtime.block_on(service.run(command_rx)))?;

    info!("Link service thread spawned");

    Ok(ServiceHandle::new(command_tx, session_rx, events_tx, thread))
}

async fn accept(listener: Option<&TcpListener>) -> IoResult<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => pending_forever().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => TokioSleepUntil(deadline).await,
        None => pending_forever().await,
    }
}

/// Resolves once the peer closes its side or sends anything: a worker
/// awaiting approval has nothing more to say until it gets its token back.
async fn peer_hung_up(stream: &TcpStream) {
    let mut probe = [0u8; 1];
    match stream.peek(&mut probe).await {
        Ok(0) => debug!("Pending worker closed its connection"),
        Ok(_) => warn!("Pending worker sent data before its pairing was answered"),
        Err(e) => debug!("Pending worker connection failed: {}", e),
    }
}

impl LinkService {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ServiceCommand>) {
        info!("Link service running");

        loop {
            if let Some(command) = self.deferred.take() {
                if self.apply(command).await.is_break() {
                    break;
                }
                continue;
            }

            let wake = {
                let listener = self.listener.as_ref();
                tokio::select! {
                    command = commands.recv() => Wake::Command(command),
                    accepted = accept(listener) => Wake::Accepted(accepted),
                }
            };

            match wake {
                Wake::Command(None) => {
                    self.stop();
                    break;
                }
                Wake::Command(Some(command)) => {
                    if self.apply(command).await.is_break() {
                        break;
                    }
                }
                Wake::Accepted(Ok((stream, addr))) => {
                    self.handle_connection(stream, addr, &mut commands).await;
                }
                Wake::Accepted(Err(e)) => {
                    error!("Failed to accept link connection: {}", e);
                    TokioSleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        info!("Link service exited");
    }

    async fn apply(&mut self, command: ServiceCommand) -> ControlFlow<()> {
        match command {
            ServiceCommand::Start => self.start().await,
            ServiceCommand::Stop => self.stop(),
            ServiceCommand::Shutdown => {
                self.stop();
                return ControlFlow::Break(());
            }
            ServiceCommand::Pair { reply } => {
                let _ = reply.send(self.pair());
            }
            ServiceCommand::Approve { token, reply } => {
                let _ = reply.send(self.resolve_approval(Decision::Approved(token)));
            }
            ServiceCommand::Deny { process_id, reply } => {
                let _ = reply.send(self.resolve_denial(&process_id));
            }
            ServiceCommand::Revoke { process_id, reply } => {
                let _ = reply.send(self.revoke(&process_id));
            }
            ServiceCommand::PairedWorkers { reply } => {
                let mut ids: Vec<String> =
                    self.auth_table.process_ids().map(str::to_string).collect();
                ids.sort();
                let _ = reply.send(ids);
            }
            ServiceCommand::ConnectedWorkers { reply } => {
                let mut ids: Vec<String> = self.connections.keys().cloned().collect();
                ids.sort();
                let _ = reply.send(ids);
            }
            ServiceCommand::Channel { process_id, reply } => {
                let _ = reply.send(self.connections.get(&process_id).cloned());
            }
            ServiceCommand::ChannelClosed {
                process_id,
                channel_id,
            } => self.forget_channel(&process_id, channel_id),
        }

        ControlFlow::Continue(())
    }

    async fn start(&mut self) {
        if self.listener.is_some() {
            debug!("Start requested but link service is already listening");
            return;
        }

        self.session.send_replace(LinkSession::starting());

        let address = format!("{LINK_BIND_ADDRESS}{}", self.config.port);
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind link service on {}: {}", address, e);
                self.session.send_replace(LinkSession::stopped());
                return;
            }
        };

        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                error!("Failed to read bound link address: {}", e);
                self.session.send_replace(LinkSession::stopped());
                return;
            }
        };

        self.listener = Some(listener);

        if let Err(e) = self.registry.write(Some(port)) {
            warn!(
                "Failed to persist link port, workers must be given it directly: {}",
                e
            );
        }

        self.session.send_replace(LinkSession::listening(port));
        info!("Link service listening on port {}", port);
        self.emit(LinkEvent::Started { port });
    }

    fn stop(&mut self) {
        let Some(listener) = self.listener.take() else {
            debug!("Stop requested but link service is not running");
            return;
        };
        drop(listener);

        for (process_id, channel) in self.connections.drain() {
            debug!("Closing link to worker {}", process_id);
            channel.close();
        }

        if let Some(pending) = self.pending.take() {
            info!(
                "Dropping pending approval for worker {} on stop",
                pending.request_id
            );
        }

        let forgotten = self.auth_table.len();
        self.auth_table.clear();

        if let Err(e) = self.registry.clear() {
            warn!("Failed to clear link port record: {}", e);
        }

        self.session.send_replace(LinkSession::stopped());
        info!("Link service stopped ({} pairings forgotten)", forgotten);
        self.emit(LinkEvent::Stopped);
    }

    fn pair(&mut self) -> Result<Token, LinkError> {
        let in_use: Vec<String> = self
            .auth_table
            .process_ids()
            .map(str::to_string)
            .chain(self.connections.keys().cloned())
            .chain(self.pending.iter().map(|p| p.request_id.clone()))
            .collect();

        let process_id = token::generate_process_id(&in_use)?;
        let minted = token::mint(&process_id)?;
        self.auth_table.insert(&minted);

        info!("Pre-authorized worker {}", process_id);
        Ok(minted)
    }

    fn resolve_approval(&mut self, decision: Decision) -> bool {
        let Decision::Approved(token) = decision else {
            return false;
        };

        match self.pending.as_mut() {
            Some(pending)
                if pending.request_id == token.process_id() && pending.decision.is_none() =>
            {
                if self.auth_table.contains(token.process_id()) {
                    debug!("Replacing existing pairing for worker {}", token.process_id());
                }
                self.auth_table.insert(&token);
                pending.decision = Some(Decision::Approved(token));
                true
            }
            _ => {
                warn!(
                    "Approval for worker {} ignored: nothing pending",
                    token.process_id()
                );
                false
            }
        }
    }

    fn resolve_denial(&mut self, process_id: &str) -> bool {
        match self.pending.as_mut() {
            Some(pending) if pending.request_id == process_id && pending.decision.is_none() => {
                pending.decision = Some(Decision::Denied);
                true
            }
            _ => {
                warn!("Denial for worker {} ignored: nothing pending", process_id);
                false
            }
        }
    }

    fn revoke(&mut self, process_id: &str) -> bool {
        let was_paired = self.auth_table.remove(process_id);

        if let Some(channel) = self.connections.remove(process_id) {
            channel.close();
            self.emit(LinkEvent::ClientDisconnected {
                process_id: process_id.to_string(),
            });
        }

        if was_paired {
            info!("Worker {} unpaired", process_id);
        }
        was_paired
    }

    fn forget_channel(&mut self, process_id: &str, channel_id: u64) {
        let is_current = self
            .connections
            .get(process_id)
            .is_some_and(|channel| channel.id() == channel_id);

        if !is_current {
            return;
        }

        // The pairing survives: the worker may reconnect with the same token.
        self.connections.remove(process_id);
        info!("Worker {} disconnected", process_id);
        self.emit(LinkEvent::ClientDisconnected {
            process_id: process_id.to_string(),
        });
    }

    async fn handle_connection(
        &mut self,
        mut stream: TcpStream,
        addr: SocketAddr,
        commands: &mut mpsc::UnboundedReceiver<ServiceCommand>,
    ) {
        if !addr.ip().is_loopback() {
            warn!("Rejected non-loopback link connection from {}", addr);
            return;
        }

        debug!("Worker connecting from {}", addr);

        match self.handshake(&mut stream, commands).await {
            Ok(token) => self.register_connection(stream, token),
            Err(e) => {
                let process_id = match &e {
                    LinkError::AuthenticationFailed { process_id, .. } => process_id.clone(),
                    _ => String::new(),
                };
                warn!(
                    "Link handshake from {} failed ({}): {}",
                    addr,
                    e.error_category(),
                    e
                );
                self.emit(LinkEvent::AuthenticationFailed {
                    process_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn handshake(
        &mut self,
        stream: &mut TcpStream,
        commands: &mut mpsc::UnboundedReceiver<ServiceCommand>,
    ) -> Result<Token, LinkError> {
        let raw = read_token(stream, self.config.handshake_timeout()).await?;
        let (process_id, _) = token::decode(&raw);

        let presented = token::parse(&raw)
            .map_err(|e| LinkError::authentication_failed(process_id.as_str(), e.to_string()))?;

        let adopted = if presented.is_placeholder() {
            self.await_approval(presented.process_id(), stream, commands)
                .await?
        } else {
            presented
        };

        if !self.auth_table.validate(&adopted) {
            return Err(LinkError::authentication_failed(
                adopted.process_id(),
                "unknown process id or secret mismatch",
            ));
        }

        write_token(stream, &token::encode_token(&adopted)).await?;
        Ok(adopted)
    }

    /// Block this handshake until the host approves or denies, keeping the
    /// command queue serviced. Stop and shutdown count as a denial and are
    /// replayed once the handshake has failed. A worker that hangs up while
    /// waiting withdraws its request.
    async fn await_approval(
        &mut self,
        process_id: &str,
        stream: &TcpStream,
        commands: &mut mpsc::UnboundedReceiver<ServiceCommand>,
    ) -> Result<Token, LinkError> {
        self.pending = Some(PendingApproval {
            request_id: process_id.to_string(),
            decision: None,
        });

        info!("Worker {} requests pairing, awaiting approval", process_id);
        self.emit(LinkEvent::ApprovalRequested {
            process_id: process_id.to_string(),
        });

        let deadline = self.config.approval_timeout().map(|t| Instant::now() + t);

        loop {
            if let Some(decision) = self.pending.as_mut().and_then(|p| p.decision.take()) {
                self.pending = None;
                return match decision {
                    Decision::Approved(token) => {
                        info!("Worker {} approved", process_id);
                        Ok(token)
                    }
                    Decision::Denied => {
                        info!("Worker {} denied", process_id);
                        Err(LinkError::authentication_failed(
                            process_id,
                            "pairing was denied",
                        ))
                    }
                };
            }

            let wake = tokio::select! {
                command = commands.recv() => ApprovalWake::Command(command),
                _ = sleep_until(deadline) => ApprovalWake::TimedOut,
                _ = peer_hung_up(stream) => ApprovalWake::PeerGone,
            };

            let command = match wake {
                ApprovalWake::Command(command) => command,
                ApprovalWake::TimedOut => {
                    warn!("Approval for worker {} timed out", process_id);
                    self.pending = None;
                    return Err(LinkError::authentication_failed(
                        process_id,
                        "pairing approval timed out",
                    ));
                }
                ApprovalWake::PeerGone => {
                    info!("Worker {} left before its pairing was answered", process_id);
                    self.pending = None;
                    return Err(LinkError::authentication_failed(
                        process_id,
                        "worker closed the connection while awaiting approval",
                    ));
                }
            };

            match command {
                Some(command @ (ServiceCommand::Stop | ServiceCommand::Shutdown)) => {
                    info!("Approval for worker {} interrupted by stop", process_id);
                    self.pending = None;
                    self.deferred = Some(command);
                    return Err(LinkError::authentication_failed(
                        process_id,
                        "link service stopped before approval",
                    ));
                }
                None => {
                    self.pending = None;
                    self.deferred = Some(ServiceCommand::Shutdown);
                    return Err(LinkError::authentication_failed(
                        process_id,
                        "link service shut down before approval",
                    ));
                }
                Some(command) => {
                    // Approve/Deny land here and set the decision checked above.
                    let _ = self.apply(command).await;
                }
            }
        }
    }

    fn register_connection(&mut self, stream: TcpStream, token: Token) {
        let process_id = token.process_id().to_string();
        let commands = self.commands.clone();
        let closed_process_id = process_id.clone();

        let channel = CallChannel::open(stream, Arc::clone(&self.handler), move |channel_id| {
            let _ = commands.send(ServiceCommand::ChannelClosed {
                process_id: closed_process_id,
                channel_id,
            });
        });

        if let Some(previous) = self.connections.insert(process_id.clone(), channel) {
            info!("Worker {} reconnected, closing previous link", process_id);
            previous.close();
        }

        info!("Worker {} connected", process_id);
        self.emit(LinkEvent::ClientConnected { token });
    }

    fn emit(&self, event: LinkEvent) {
        debug!("Link event: {:?}", event);
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}
