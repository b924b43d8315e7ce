//! Test helpers for link integration tests.
//!
//! - Isolated configs (port record inside a temp dir, short intervals)
//! - A host/worker call handler with a couple of methods
//! - Waiting on link events with a timeout

use link_core::config::LinkConfig;
use link_core::link::{CallHandler, LinkBroker, WorkerClient};
use link_core::registry::PortRegistry;
use link_core::token;

use models::{LinkEvent, Token};

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout as TokioTimeout;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handler exposing `echo` and `add`, tagged with which side answered.
pub struct TestHandler {
    pub side: &'static str,
}

impl CallHandler for TestHandler {
    fn handle(&self, method: &str, params: Value) -> Result<Value, String> {
        match method {
            "echo" => Ok(params),
            "whoami" => Ok(json!(self.side)),
            "add" => {
                let a = params["a"].as_i64().ok_or("missing a")?;
                let b = params["b"].as_i64().ok_or("missing b")?;
                Ok(json!(a + b))
            }
            other => Err(format!("unknown method '{other}'")),
        }
    }
}

pub fn test_config(dir: &TempDir) -> LinkConfig {
    let mut config = LinkConfig::default();
    config.service.port_file = Some(dir.path().join("blender_link.json"));
    config.service.handshake_timeout_ms = 2_000;
    config.broker.ensure_attempts = 20;
    config.broker.ensure_interval_ms = 100;
    config.client.connect_timeout_ms = 1_000;
    config.client.response_timeout_secs = 10;
    config.client.call_timeout_ms = 2_000;
    config
}

pub fn new_broker(config: &LinkConfig) -> LinkBroker {
    LinkBroker::new(config.clone(), Arc::new(TestHandler { side: "host" })).expect("broker starts")
}

/// Broker that is already listening, with an event receiver subscribed
/// before the start.
pub async fn running_broker(config: &LinkConfig) -> (LinkBroker, broadcast::Receiver<LinkEvent>, u16) {
    let broker = new_broker(config);
    let events = broker.subscribe();
    assert!(broker.ensure_running().await, "Service should start");
    let port = broker.port().expect("listening service has a port");
    (broker, events, port)
}

pub fn new_worker(config: &LinkConfig) -> WorkerClient {
    WorkerClient::new(
        config.client.clone(),
        PortRegistry::new(config.service.port_file.clone().expect("test config has port file")),
        Arc::new(TestHandler { side: "worker" }),
    )
}

pub fn placeholder(process_id: &str) -> Token {
    token::placeholder_token(process_id).expect("valid process id")
}

/// Wait for the first event matching `predicate`, skipping others.
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<LinkEvent>, mut predicate: F) -> LinkEvent
where
    F: FnMut(&LinkEvent) -> bool,
{
    let found = TokioTimeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("Event channel closed"),
            }
        }
    })
    .await;

    found.expect("Timed out waiting for link event")
}

pub async fn wait_for_approval_request(events: &mut broadcast::Receiver<LinkEvent>) -> String {
    match wait_for_event(events, |e| matches!(e, LinkEvent::ApprovalRequested { .. })).await {
        LinkEvent::ApprovalRequested { process_id } => process_id,
        other => panic!("Expected ApprovalRequested, got {other:?}"),
    }
}

/// Pair a worker through interactive approval and return the adopted token.
pub async fn pair_interactively(
    broker: &Arc<LinkBroker>,
    events: &mut broadcast::Receiver<LinkEvent>,
    worker: &mut WorkerClient,
    port: u16,
    process_id: &str,
) -> Token {
    let approver = {
        let broker = Arc::clone(broker);
        let mut events = events.resubscribe();
        tokio::spawn(async move {
            let requested = wait_for_approval_request(&mut events).await;
            broker.approve(&requested).await.expect("service reachable")
        })
    };

    worker
        .connect(Some(port), Some(placeholder(process_id)))
        .await
        .expect("approved worker connects");

    let approved = approver
        .await
        .expect("approver task")
        .expect("approval was pending");

    wait_for_event(events, |e| matches!(e, LinkEvent::ClientConnected { .. })).await;
    approved
}
