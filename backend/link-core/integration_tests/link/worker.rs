use super::helpers::{
    new_worker, pair_interactively, placeholder, running_broker, test_config,
    wait_for_approval_request, wait_for_event,
};

use link_core::error::LinkError;
use link_core::link::{LinkBroker, PING_METHOD};
use link_core::token;
use link_core::{ENV_LINK_PORT, ENV_LINK_TOKEN};

use models::{LinkEvent, TOKEN_LENGTH};

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout as TokioTimeout;

/// Sets link environment variables for one test and restores them on drop.
struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    fn set(vars: &[(&'static str, Option<String>)]) -> Self {
        let saved = vars
            .iter()
            .map(|(key, _)| (*key, std::env::var(key).ok()))
            .collect();
        for (key, value) in vars {
            apply(key, value.as_deref());
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            apply(key, value.as_deref());
        }
    }
}

fn apply(key: &str, value: Option<&str>) {
    // SAFETY: every test touching these variables is #[serial].
    unsafe {
        match value {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
}

fn approve_next(broker: &Arc<LinkBroker>, events: &broadcast::Receiver<LinkEvent>) -> tokio::task::JoinHandle<String> {
    let broker = Arc::clone(broker);
    let mut events = events.resubscribe();
    tokio::spawn(async move {
        let requested = wait_for_approval_request(&mut events).await;
        broker
            .approve(&requested)
            .await
            .expect("service reachable")
            .expect("approval was pending");
        requested
    })
}

/// **VALUE**: Verifies that a rejected token falls back to interactive pairing.
///
/// **WHY THIS MATTERS**: A worker restarted against a restarted host carries a
/// token the new session has never seen; it must ask again instead of failing.
#[tokio::test]
async fn given_stale_token_when_connecting_then_retries_with_placeholder() {
    // GIVEN: A running service and a token it never issued
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let stale = token::mint("00020").expect("valid id");
    let approver = approve_next(&broker, &events);

    // WHEN: Connecting with the stale token
    let mut worker = new_worker(&config);
    worker
        .connect(Some(port), Some(stale.clone()))
        .await
        .expect("placeholder retry is approved");

    // THEN: The stale token was rejected, then the same id asked for approval
    let failed = wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::AuthenticationFailed { .. })
    })
    .await;
    assert!(matches!(
        failed,
        LinkEvent::AuthenticationFailed { ref process_id, .. } if process_id == "00020"
    ));
    assert_eq!(approver.await.expect("approver task"), "00020");

    // THEN: The worker holds a new secret for the same id
    let adopted = worker.token().expect("adopted token");
    assert_eq!(adopted.process_id(), "00020");
    assert_ne!(adopted, &stale);
}

/// **VALUE**: Verifies that any failed connect with a real token is retried
/// with a placeholder, not only an outright rejection.
///
/// **BUG THIS CATCHES**: Retrying only on authentication errors leaves a worker
/// stranded when the service answers with a token it cannot adopt.
#[tokio::test]
async fn given_real_token_when_service_answers_unexpected_token_then_retries_with_placeholder() {
    // GIVEN: A loopback endpoint that answers every handshake with another
    // worker's token
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let answer = token::encode_token(&token::mint("00099").expect("valid id"));
    let endpoint = tokio::spawn(async move {
        let mut presented = Vec::new();
        while let Ok(Ok((mut stream, _))) =
            TokioTimeout(Duration::from_secs(2), listener.accept()).await
        {
            let mut raw = [0u8; TOKEN_LENGTH];
            if stream.read_exact(&mut raw).await.is_err() {
                break;
            }
            presented.push(String::from_utf8_lossy(&raw).into_owned());
            let _ = stream.write_all(answer.as_bytes()).await;
        }
        presented
    });

    // WHEN: Connecting with a real token
    let mut worker = new_worker(&config);
    let real = token::mint("00050").expect("valid id");
    let result = worker.connect(Some(port), Some(real.clone())).await;

    // THEN: Both attempts fail on the mismatched answer
    assert!(matches!(result, Err(LinkError::Protocol { .. })), "Got {result:?}");

    // THEN: The second attempt was a placeholder for the same id
    let presented = endpoint.await.expect("endpoint task");
    assert_eq!(presented.len(), 2, "Expected one retry, saw {presented:?}");
    assert_eq!(presented[0], token::encode_token(&real));
    let retried = token::parse(&presented[1]).expect("well formed");
    assert_eq!(retried.process_id(), "00050");
    assert!(retried.is_placeholder());
}

/// **VALUE**: Verifies that a rejected placeholder is not retried.
#[tokio::test]
async fn given_placeholder_when_denied_then_no_second_attempt() {
    // GIVEN: A running service that denies the first request
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let denier = {
        let broker = Arc::clone(&broker);
        let mut events = events.resubscribe();
        tokio::spawn(async move {
            let requested = wait_for_approval_request(&mut events).await;
            broker.deny(&requested).await.expect("reachable")
        })
    };

    // WHEN: Connecting with a placeholder
    let mut worker = new_worker(&config);
    let result = worker.connect(Some(port), Some(placeholder("00021"))).await;

    // THEN: Exactly one approval request was raised
    assert!(result.is_err());
    assert!(denier.await.expect("denier task"));
    wait_for_approval_request(&mut events).await;
    let failed = wait_for_event(&mut events, |e| {
        matches!(
            e,
            LinkEvent::AuthenticationFailed { .. } | LinkEvent::ApprovalRequested { .. }
        )
    })
    .await;
    assert!(matches!(failed, LinkEvent::AuthenticationFailed { .. }));
    assert!(
        events.try_recv().is_err(),
        "No further request expected after a refused placeholder"
    );
}

/// **VALUE**: Verifies calls in both directions over one connection.
///
/// **WHY THIS MATTERS**: The link exists so the host can drive the worker and
/// the worker can report back; either direction failing defeats it.
#[tokio::test]
async fn given_connected_worker_when_calling_both_ways_then_each_side_answers() {
    // GIVEN: A paired, connected worker
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let mut worker = new_worker(&config);
    pair_interactively(&broker, &mut events, &mut worker, port, "00022").await;

    // WHEN: The worker calls the host
    let sum = worker
        .call("add", json!({ "a": 2, "b": 40 }))
        .await
        .expect("host answers");
    let host_side = worker.call("whoami", json!(null)).await.expect("host answers");

    // WHEN: The host calls the worker
    let worker_side = broker
        .call_worker("00022", "whoami", json!(null))
        .await
        .expect("worker answers");
    let echoed = broker
        .call_worker("00022", "echo", json!({ "mesh": "cube" }))
        .await
        .expect("worker answers");

    // THEN: Each call reached the right side
    assert_eq!(sum, json!(42));
    assert_eq!(host_side, json!("host"));
    assert_eq!(worker_side, json!("worker"));
    assert_eq!(echoed, json!({ "mesh": "cube" }));
}

/// **VALUE**: Verifies that handler errors come back as remote call errors and
/// the built-in ping bypasses the handler.
#[tokio::test]
async fn given_connected_worker_when_calling_unknown_method_then_returns_rpc_error() {
    // GIVEN: A connected worker
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let mut worker = new_worker(&config);
    pair_interactively(&broker, &mut events, &mut worker, port, "00023").await;

    // WHEN: Calling a method the host does not have, and pinging
    let missing = worker.call("does.not.exist", json!({})).await;
    let ping = worker.call(PING_METHOD, json!("hello")).await;

    // THEN: An Rpc error naming the method, and an echoed ping
    match missing {
        Err(LinkError::Rpc { method, message, .. }) => {
            assert_eq!(method, "does.not.exist");
            assert!(message.contains("unknown method"));
        }
        other => panic!("Expected Rpc error, got {other:?}"),
    }
    assert_eq!(ping.expect("ping answered"), json!("hello"));
}

/// **VALUE**: Verifies that a worker notices the host stopping.
///
/// **BUG THIS CATCHES**: Reporting a stale channel as connected would make the
/// worker queue calls into a dead socket.
#[tokio::test]
async fn given_connected_worker_when_host_stops_then_is_connected_false() {
    // GIVEN: A connected worker
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let mut worker = new_worker(&config);
    pair_interactively(&broker, &mut events, &mut worker, port, "00024").await;
    assert!(worker.is_connected().await);

    // WHEN: The host stops the link
    broker.stop_link().expect("reachable");
    wait_for_event(&mut events, |e| matches!(e, LinkEvent::Stopped)).await;

    // THEN: The worker reports disconnected and cleans up
    assert!(!worker.is_connected().await);
    assert_eq!(worker.port(), None);
    assert!(matches!(
        worker.call("add", json!({ "a": 1, "b": 1 })).await,
        Err(LinkError::ChannelClosed { .. })
    ));

    // THEN: Stop invalidated every pairing
    assert!(broker.paired_workers().await.expect("reachable").is_empty());
}

/// **VALUE**: Verifies that a worker leaving raises `ClientDisconnected` but keeps
/// its pairing.
#[tokio::test]
async fn given_connected_worker_when_it_disconnects_then_host_sees_disconnect() {
    // GIVEN: A connected worker
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let mut worker = new_worker(&config);
    pair_interactively(&broker, &mut events, &mut worker, port, "00025").await;

    // WHEN: The worker disconnects (twice)
    worker.disconnect();
    worker.disconnect();

    // THEN: The host sees it leave; the pairing survives for reconnects
    let event = wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::ClientDisconnected { .. })
    })
    .await;
    assert_eq!(
        event,
        LinkEvent::ClientDisconnected {
            process_id: "00025".to_string()
        }
    );
    assert!(broker.connected_workers().await.expect("reachable").is_empty());
    assert_eq!(
        broker.paired_workers().await.expect("reachable"),
        vec!["00025".to_string()]
    );
    assert!(matches!(
        broker.call_worker("00025", "echo", json!(1)).await,
        Err(LinkError::ChannelClosed { .. })
    ));
}

/// **VALUE**: Verifies that the host can cut a worker off.
#[tokio::test]
async fn given_connected_worker_when_host_disconnects_it_then_pairing_is_revoked() {
    // GIVEN: A connected worker
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let mut worker = new_worker(&config);
    let token = pair_interactively(&broker, &mut events, &mut worker, port, "00026").await;

    // WHEN: The host disconnects the worker
    let removed = broker.disconnect_worker("00026").await.expect("reachable");

    // THEN: The worker is gone and its token no longer works
    assert!(removed);
    assert!(!broker.disconnect_worker("00026").await.expect("reachable"));
    assert!(!worker.is_connected().await);
    assert!(broker.paired_workers().await.expect("reachable").is_empty());

    // THEN: Reconnecting with the old token falls back to approval
    let approver = approve_next(&broker, &events);
    let mut again = new_worker(&config);
    again
        .connect(Some(port), Some(token.clone()))
        .await
        .expect("re-approved");
    assert_eq!(approver.await.expect("approver task"), "00026");
}

/// **VALUE**: Verifies that connecting to a dead port fails without hanging.
#[tokio::test]
async fn given_no_service_when_connecting_then_returns_io_error() {
    // GIVEN: A port with nothing listening (bound, then released)
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    // WHEN: Connecting
    let mut worker = new_worker(&config);
    let result = worker.connect(Some(port), Some(placeholder("00027"))).await;

    // THEN: An I/O error, and still disconnected
    assert!(matches!(result, Err(LinkError::Io { .. })), "Got {result:?}");
    assert!(!worker.is_connected().await);
}

/// **VALUE**: Verifies that port and token are taken from the environment.
///
/// **WHY THIS MATTERS**: This is how a worker launched by the host finds it.
#[tokio::test]
#[serial]
async fn given_link_env_when_connecting_without_arguments_then_uses_env() {
    // GIVEN: A running service and the link variables set
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let _env = EnvGuard::set(&[
        (ENV_LINK_PORT, Some(port.to_string())),
        (
            ENV_LINK_TOKEN,
            Some(token::encode_token(&placeholder("00030"))),
        ),
    ]);
    let approver = approve_next(&broker, &events);

    // WHEN: Connecting with no arguments
    let mut worker = new_worker(&config);
    worker.connect(None, None).await.expect("env connect");

    // THEN: The environment's port and process id were used
    assert_eq!(approver.await.expect("approver task"), "00030");
    assert_eq!(worker.port(), Some(port));
    assert_eq!(worker.token().expect("adopted").process_id(), "00030");
}

/// **VALUE**: Verifies the port record fallback when the environment is empty.
#[tokio::test]
#[serial]
async fn given_no_env_when_connecting_then_reads_port_record() {
    // GIVEN: A running service and no link variables
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let _env = EnvGuard::set(&[(ENV_LINK_PORT, None), (ENV_LINK_TOKEN, None)]);
    let approver = approve_next(&broker, &events);

    // WHEN: Connecting without a port
    let mut worker = new_worker(&config);
    worker
        .connect(None, Some(placeholder("00031")))
        .await
        .expect("registry connect");

    // THEN: The recorded port was used
    assert_eq!(approver.await.expect("approver task"), "00031");
    assert_eq!(worker.port(), Some(port));
}

/// **VALUE**: Verifies that a worker with no way to find the service says so.
#[tokio::test]
#[serial]
async fn given_no_env_and_no_record_when_connecting_then_returns_service_unavailable() {
    // GIVEN: No link variables and an empty temp dir as registry location
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let _env = EnvGuard::set(&[(ENV_LINK_PORT, None), (ENV_LINK_TOKEN, None)]);

    // WHEN: Connecting without a port
    let mut worker = new_worker(&config);
    let result = worker.connect(None, None).await;

    // THEN: ServiceUnavailable
    assert!(
        matches!(result, Err(LinkError::ServiceUnavailable { .. })),
        "Got {result:?}"
    );
}

/// **VALUE**: Verifies that a reconnect prefers the adopted token over the one
/// the worker was launched with.
///
/// **BUG THIS CATCHES**: Re-reading `BLENDER_LINK_TOKEN` on every connect would
/// present the superseded secret and ask the user to approve the worker again.
#[tokio::test]
#[serial]
async fn given_adopted_token_when_reconnecting_then_env_token_is_not_reused() {
    // GIVEN: A worker launched with a token the service never issued
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let stale = token::mint("00032").expect("valid id");
    let _env = EnvGuard::set(&[
        (ENV_LINK_PORT, Some(port.to_string())),
        (ENV_LINK_TOKEN, Some(token::encode_token(&stale))),
    ]);
    let approver = approve_next(&broker, &events);

    // GIVEN: It paired through approval and then dropped the connection
    let mut worker = new_worker(&config);
    worker.connect(None, None).await.expect("approved connect");
    assert_eq!(approver.await.expect("approver task"), "00032");
    let adopted = worker.token().expect("adopted token").clone();
    wait_for_event(&mut events, |e| matches!(e, LinkEvent::ClientConnected { .. })).await;
    worker.disconnect();
    wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::ClientDisconnected { .. })
    })
    .await;

    // WHEN: Reconnecting without arguments
    worker.connect(None, None).await.expect("reconnect");

    // THEN: The adopted token went straight through
    let event = wait_for_event(&mut events, |e| {
        matches!(
            e,
            LinkEvent::ClientConnected { .. }
                | LinkEvent::ApprovalRequested { .. }
                | LinkEvent::AuthenticationFailed { .. }
        )
    })
    .await;
    assert_eq!(event, LinkEvent::ClientConnected { token: adopted.clone() });
    assert_eq!(worker.token(), Some(&adopted));
}
