//! Bidirectional call channel carried over a link connection after the
//! handshake.
//!
//! Both ends speak the same protocol: one JSON frame per line, either a
//! request (`{"kind":"request","id":1,"method":"...","params":...}`) or a
//! response (`{"kind":"response","id":1,"result":...}` /
//! `{"kind":"response","id":1,"error":"..."}`). Either side may call the other
//! at any time; responses are matched to requests by id.

use crate::error::link::LinkError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::spawn as TokioSpawn;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::spawn_blocking as TokioSpawnBlocking;
use tokio::time::timeout as TokioTimeout;

/// Built-in method answered by the channel itself; echoes its params.
pub const PING_METHOD: &str = "link.ping";

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Operations one side of the link exposes to the other.
///
/// This is the context object handed to the channel when the connection is
/// made. Handlers run on the blocking pool, so they may do synchronous work.
pub trait CallHandler: Send + Sync {
    fn handle(&self, method: &str, params: Value) -> Result<Value, String>;
}

/// Handler that exposes nothing beyond the built-in ping.
pub struct NoopHandler;

impl CallHandler for NoopHandler {
    fn handle(&self, method: &str, _params: Value) -> Result<Value, String> {
        Err(format!("unknown method '{method}'"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Frame {
    Request {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

enum Outbound {
    Frame(String),
    Close,
}

type PendingCalls = HashMap<u64, oneshot::Sender<Result<Value, String>>>;

struct Shared {
    id: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<PendingCalls>,
    next_request_id: AtomicU64,
    closed: watch::Sender<bool>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_frame(&self, frame: &Frame) -> bool {
        match serde_json::to_string(frame) {
            Ok(line) => self.outbound.send(Outbound::Frame(line)).is_ok(),
            Err(e) => {
                warn!("Channel {}: failed to encode frame: {}", self.id, e);
                false
            }
        }
    }

    fn send_response(&self, id: u64, outcome: Result<Value, String>) {
        let frame = match outcome {
            Ok(result) => Frame::Response {
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => Frame::Response {
                id,
                result: None,
                error: Some(error),
            },
        };

        if !self.send_frame(&frame) {
            debug!("Channel {}: dropped response {} after close", self.id, id);
        }
    }

    fn shutdown(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        // Dropping the senders fails every outstanding call with ChannelClosed.
        self.pending().clear();
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// One end of a live link connection.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct CallChannel {
    shared: Arc<Shared>,
}

impl CallChannel {
    /// Start serving `stream`.
    ///
    /// Incoming requests are answered by `handler`. `on_close` runs once with
    /// the channel id when the connection ends, whichever side closed it.
    pub fn open<F>(stream: TcpStream, handler: Arc<dyn CallHandler>, on_close: F) -> Self
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            outbound: outbound_tx,
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            closed: closed_tx,
        });

        debug!("Channel {} opened", shared.id);

        TokioSpawn(write_loop(shared.id, write_half, outbound_rx));
        TokioSpawn(read_loop(read_half, Arc::clone(&shared), handler, on_close));

        Self { shared }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    /// Close the connection. Safe to call more than once.
    pub fn close(&self) {
        self.shared.shutdown();
    }

    /// Invoke `method` on the other side and wait for its answer.
    ///
    /// # Errors
    ///
    /// - [`LinkError::ChannelClosed`] if the connection is gone or closes mid-call
    /// - [`LinkError::Timeout`] if no answer arrives within `limit`
    /// - [`LinkError::Rpc`] if the other side answered with an error
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        limit: Duration,
    ) -> Result<Value, LinkError> {
        if self.is_closed() {
            return Err(LinkError::channel_closed());
        }

        let id = self.shared.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared.pending().insert(id, reply_tx);

        let frame = Frame::Request {
            id,
            method: method.to_string(),
            params,
        };

        if !self.shared.send_frame(&frame) {
            self.shared.pending().remove(&id);
            return Err(LinkError::channel_closed());
        }

        trace!("Channel {}: sent request {} '{}'", self.shared.id, id, method);

        match TokioTimeout(limit, reply_rx).await {
            Err(_) => {
                self.shared.pending().remove(&id);
                Err(LinkError::timeout(format!(
                    "'{method}' did not answer within {limit:?}"
                )))
            }
            Ok(Err(_)) => Err(LinkError::channel_closed()),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(LinkError::rpc(method, message)),
        }
    }

    /// Liveness probe: a round trip of the built-in ping.
    pub async fn ping(&self, limit: Duration) -> bool {
        self.call(PING_METHOD, Value::Null, limit).await.is_ok()
    }
}

async fn write_loop(
    channel_id: u64,
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(Outbound::Frame(mut line)) = outbound.recv().await {
        line.push('\n');
        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            warn!("Channel {}: write failed: {}", channel_id, e);
            break;
        }
    }

    let _ = write_half.shutdown().await;
    debug!("Channel {} writer stopped", channel_id);
}

async fn read_loop<F>(
    read_half: OwnedReadHalf,
    shared: Arc<Shared>,
    handler: Arc<dyn CallHandler>,
    on_close: F,
) where
    F: FnOnce(u64) + Send + 'static,
{
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let next = tokio::select! {
            line = lines.next_line() => line,
            _ = wait_closed(shared.closed.subscribe()) => break,
        };

        match next {
            Ok(Some(line)) => dispatch(&shared, &handler, &line),
            Ok(None) => {
                debug!("Channel {}: peer closed the connection", shared.id);
                break;
            }
            Err(e) => {
                warn!("Channel {}: read failed: {}", shared.id, e);
                break;
            }
        }
    }

    shared.shutdown();
    on_close(shared.id);
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}

fn dispatch(shared: &Arc<Shared>, handler: &Arc<dyn CallHandler>, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    let frame: Frame = match serde_json::from_str(trimmed) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Channel {}: ignoring invalid frame: {}", shared.id, e);
            return;
        }
    };

    match frame {
        Frame::Request { id, method, params } => {
            trace!("Channel {}: request {} '{}'", shared.id, id, method);

            if method == PING_METHOD {
                shared.send_response(id, Ok(params));
                return;
            }

            let shared = Arc::clone(shared);
            let handler = Arc::clone(handler);
            TokioSpawnBlocking(move || {
                let outcome = handler.handle(&method, params);
                shared.send_response(id, outcome);
            });
        }
        Frame::Response { id, result, error } => {
            let Some(reply) = shared.pending().remove(&id) else {
                debug!("Channel {}: response {} has no caller", shared.id, id);
                return;
            };

            let outcome = match error {
                Some(message) => Err(message),
                None => Ok(result.unwrap_or(Value::Null)),
            };
            let _ = reply.send(outcome);
        }
    }
}
