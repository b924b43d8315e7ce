use super::helpers::{
    new_broker, new_worker, pair_interactively, placeholder, running_broker, test_config,
    wait_for_approval_request, wait_for_event,
};

use link_core::error::LinkError;
use link_core::registry::PortRegistry;
use link_core::token;

use models::{LinkEvent, LinkState, TOKEN_LENGTH};

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout as TokioTimeout;

fn registry_for(dir: &TempDir) -> PortRegistry {
    PortRegistry::new(dir.path().join("blender_link.json"))
}

/// **VALUE**: Verifies that starting the service binds a port, records it and
/// raises `Started`.
///
/// **WHY THIS MATTERS**: Workers started without an explicit port find the
/// service only through the port record.
#[tokio::test]
async fn given_stopped_service_when_started_then_listens_and_records_port() {
    // GIVEN: A stopped broker
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let broker = new_broker(&config);
    let mut events = broker.subscribe();
    assert_eq!(broker.session().state, LinkState::Stopped);

    // WHEN: Starting
    broker.start_link().expect("service reachable");
    let event = wait_for_event(&mut events, |e| matches!(e, LinkEvent::Started { .. })).await;

    // THEN: Listening on the announced port, which is recorded on disk
    let LinkEvent::Started { port } = event else {
        unreachable!()
    };
    assert!(broker.is_running());
    assert_eq!(broker.port(), Some(port));
    assert_eq!(registry_for(&dir).read().expect("readable"), Some(port));

    broker.shutdown().await;
}

/// **VALUE**: Verifies that starting twice keeps the same endpoint.
///
/// **BUG THIS CATCHES**: A second bind would orphan connected workers on the
/// first port and overwrite the port record.
#[tokio::test]
async fn given_running_service_when_started_again_then_port_is_unchanged() {
    // GIVEN: A running service
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    wait_for_event(&mut events, |e| matches!(e, LinkEvent::Started { .. })).await;

    // WHEN: Starting again
    broker.start_link().expect("service reachable");
    assert!(broker.ensure_running().await);

    // THEN: Same port, and no second Started event
    assert_eq!(broker.port(), Some(port));
    let second = TokioTimeout(Duration::from_millis(300), events.recv()).await;
    assert!(second.is_err(), "No further event expected, got {second:?}");

    broker.shutdown().await;
}

/// **VALUE**: Verifies that stop clears the port record and is idempotent.
#[tokio::test]
async fn given_running_service_when_stopped_twice_then_record_is_empty_and_one_event() {
    // GIVEN: A running service
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, _port) = running_broker(&config).await;

    // WHEN: Stopping twice
    broker.stop_link().expect("service reachable");
    broker.stop_link().expect("service reachable");
    wait_for_event(&mut events, |e| matches!(e, LinkEvent::Stopped)).await;

    // THEN: Stopped, record is `{}`, and only one Stopped event arrives
    assert!(!broker.is_running());
    assert_eq!(broker.port(), None);
    assert_eq!(registry_for(&dir).read().expect("readable"), None);
    let contents = std::fs::read_to_string(dir.path().join("blender_link.json")).expect("file");
    assert_eq!(contents.trim(), "{}");

    let extra = TokioTimeout(Duration::from_millis(300), events.recv()).await;
    assert!(extra.is_err(), "No second Stopped expected, got {extra:?}");

    broker.shutdown().await;
}

/// **VALUE**: Verifies that a stopped service can be started again.
#[tokio::test]
async fn given_stopped_service_when_restarted_then_listens_again() {
    // GIVEN: A service that was started and stopped
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, _) = running_broker(&config).await;
    broker.stop_link().expect("service reachable");
    wait_for_event(&mut events, |e| matches!(e, LinkEvent::Stopped)).await;

    // WHEN: Ensuring it runs again
    let running = broker.ensure_running().await;

    // THEN: Listening with a recorded port
    assert!(running);
    assert_eq!(registry_for(&dir).read().expect("readable"), broker.port());

    broker.shutdown().await;
}

/// **VALUE**: Verifies the deny path: the worker is refused and nothing is paired.
#[tokio::test]
async fn given_placeholder_worker_when_denied_then_connect_fails_and_nothing_paired() {
    // GIVEN: A running service and a worker presenting a placeholder
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);

    let denier = {
        let broker = Arc::clone(&broker);
        let mut events = events.resubscribe();
        tokio::spawn(async move {
            let requested = wait_for_approval_request(&mut events).await;
            broker.deny(&requested).await.expect("service reachable")
        })
    };

    // WHEN: The worker connects and the host denies
    let mut worker = new_worker(&config);
    let result = worker.connect(Some(port), Some(placeholder("00010"))).await;

    // THEN: The connect fails with an authentication error
    assert!(denier.await.expect("denier task"), "Approval should have been pending");
    assert!(
        matches!(result, Err(LinkError::AuthenticationFailed { .. })),
        "Got {result:?}"
    );
    assert!(worker.token().is_none());

    // THEN: The failure is reported and nothing is paired
    let failed = wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::AuthenticationFailed { .. })
    })
    .await;
    assert!(matches!(
        failed,
        LinkEvent::AuthenticationFailed { ref process_id, .. } if process_id == "00010"
    ));
    assert!(broker.paired_workers().await.expect("reachable").is_empty());
}

/// **VALUE**: Verifies the approve path: the worker adopts a fresh secret under
/// the same process id.
///
/// **WHY THIS MATTERS**: The adopted token is what lets the worker reconnect
/// later without asking the user again.
#[tokio::test]
async fn given_placeholder_worker_when_approved_then_adopts_minted_token() {
    // GIVEN: A running service
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let mut worker = new_worker(&config);

    // WHEN: The worker asks for pairing and the host approves
    let approved = pair_interactively(&broker, &mut events, &mut worker, port, "00011").await;

    // THEN: The worker holds the minted token and the host trusts it
    let adopted = worker.token().expect("adopted token").clone();
    assert_eq!(adopted, approved);
    assert_eq!(adopted.process_id(), "00011");
    assert!(!adopted.is_placeholder());
    assert_eq!(worker.port(), Some(port));
    assert_eq!(
        broker.paired_workers().await.expect("reachable"),
        vec!["00011".to_string()]
    );
    assert_eq!(
        broker.connected_workers().await.expect("reachable"),
        vec!["00011".to_string()]
    );
}

/// **VALUE**: Verifies that a paired worker reconnects without approval.
#[tokio::test]
async fn given_paired_worker_when_reconnecting_with_token_then_accepted_directly() {
    // GIVEN: A worker paired through approval, then disconnected
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let mut worker = new_worker(&config);
    let token = pair_interactively(&broker, &mut events, &mut worker, port, "00012").await;
    worker.disconnect();
    wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::ClientDisconnected { .. })
    })
    .await;

    // WHEN: Reconnecting with the adopted token
    let mut again = new_worker(&config);
    again
        .connect(Some(port), Some(token.clone()))
        .await
        .expect("known token is accepted");

    // THEN: Connected immediately, with no approval request in between
    let event = wait_for_event(&mut events, |e| {
        matches!(
            e,
            LinkEvent::ClientConnected { .. } | LinkEvent::ApprovalRequested { .. }
        )
    })
    .await;
    assert_eq!(event, LinkEvent::ClientConnected { token: token.clone() });
    assert_eq!(again.token(), Some(&token));

    // THEN: The connection was announced exactly once
    assert!(again.is_connected().await);
    while let Ok(extra) = events.try_recv() {
        assert!(
            !matches!(extra, LinkEvent::ClientConnected { .. }),
            "Unexpected second announcement: {extra:?}"
        );
    }
}

/// **VALUE**: Verifies that a wrong secret is rejected and reported.
///
/// **BUG THIS CATCHES**: Comparing only process ids would let any local process
/// take over a paired worker's identity.
#[tokio::test]
async fn given_wrong_secret_when_handshaking_then_connection_is_closed() {
    // GIVEN: A paired worker
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let mut worker = new_worker(&config);
    let token = pair_interactively(&broker, &mut events, &mut worker, port, "00013").await;

    // WHEN: Someone presents the same id with another secret
    let forged = token::mint("00013").expect("valid id");
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
    stream
        .write_all(token::encode_token(&forged).as_bytes())
        .await
        .expect("write");

    // THEN: The service closes without answering
    let mut reply = Vec::new();
    let read = TokioTimeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("service answers promptly");
    assert!(read.is_err() || reply.is_empty(), "No token expected, got {reply:?}");

    // THEN: The failure names the process id
    let failed = wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::AuthenticationFailed { .. })
    })
    .await;
    assert!(matches!(
        failed,
        LinkEvent::AuthenticationFailed { ref process_id, .. } if process_id == "00013"
    ));

    // THEN: The real worker is unaffected
    assert!(worker.is_connected().await);

    // THEN: The pairing still holds the original secret
    worker.disconnect();
    wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::ClientDisconnected { .. })
    })
    .await;
    let mut again = new_worker(&config);
    again
        .connect(Some(port), Some(token.clone()))
        .await
        .expect("original token is still trusted");
    let event = wait_for_event(&mut events, |e| {
        matches!(
            e,
            LinkEvent::ClientConnected { .. } | LinkEvent::ApprovalRequested { .. }
        )
    })
    .await;
    assert_eq!(event, LinkEvent::ClientConnected { token });
}

/// **VALUE**: Verifies that unreadable handshakes do not stop the service.
#[tokio::test]
async fn given_garbage_handshake_when_received_then_service_keeps_accepting() {
    // GIVEN: A running service
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);

    // WHEN: A client sends TOKEN_LENGTH bytes of garbage
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
    stream
        .write_all(&[b'x'; TOKEN_LENGTH])
        .await
        .expect("write");

    // THEN: A failure with no process id is reported
    let failed = wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::AuthenticationFailed { .. })
    })
    .await;
    assert!(matches!(
        failed,
        LinkEvent::AuthenticationFailed { ref process_id, .. } if process_id.is_empty()
    ));

    // THEN: A legitimate worker can still pair
    let mut worker = new_worker(&config);
    pair_interactively(&broker, &mut events, &mut worker, port, "00014").await;
    assert!(worker.is_connected().await);
}

/// **VALUE**: Verifies that a silent client is dropped after the handshake timeout.
#[tokio::test]
async fn given_silent_client_when_timeout_elapses_then_handshake_fails() {
    // GIVEN: A service with a short handshake timeout
    let dir = TempDir::new().expect("temp dir");
    let mut config = test_config(&dir);
    config.service.handshake_timeout_ms = 200;
    let (_broker, mut events, port) = running_broker(&config).await;

    // WHEN: A client connects and says nothing
    let _stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");

    // THEN: The handshake fails with a timeout reason
    let failed = wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::AuthenticationFailed { .. })
    })
    .await;
    let LinkEvent::AuthenticationFailed { reason, .. } = failed else {
        unreachable!()
    };
    assert!(reason.contains("Timeout"), "Unexpected reason: {reason}");
}

/// **VALUE**: Verifies that stopping during a pending approval resolves it as
/// denied and then stops.
///
/// **WHY THIS MATTERS**: The service thread would otherwise hang forever
/// waiting for an answer nobody can give.
#[tokio::test]
async fn given_pending_approval_when_stopped_then_worker_refused_and_service_stops() {
    // GIVEN: A worker waiting for approval
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let worker_task = {
        let config = config.clone();
        tokio::spawn(async move {
            let mut worker = new_worker(&config);
            worker.connect(Some(port), Some(placeholder("00015"))).await
        })
    };
    let requested = wait_for_approval_request(&mut events).await;
    assert_eq!(requested, "00015");

    // WHEN: The host stops the link
    broker.stop_link().expect("service reachable");

    // THEN: The worker is refused and the service stops
    let result = worker_task.await.expect("worker task");
    assert!(
        matches!(result, Err(LinkError::AuthenticationFailed { .. })),
        "Got {result:?}"
    );
    wait_for_event(&mut events, |e| matches!(e, LinkEvent::Stopped)).await;
    assert!(!broker.is_running());
    assert_eq!(registry_for(&dir).read().expect("readable"), None);

    // THEN: A late approval finds nothing pending
    assert_eq!(broker.approve("00015").await.expect("reachable"), None);
    assert!(!broker.deny("00015").await.expect("reachable"));

    broker.shutdown().await;
}

/// **VALUE**: Verifies that an unanswered approval times out when configured to.
#[tokio::test]
async fn given_approval_timeout_when_host_never_answers_then_worker_refused() {
    // GIVEN: A service with a one second approval timeout
    let dir = TempDir::new().expect("temp dir");
    let mut config = test_config(&dir);
    config.service.approval_timeout_secs = Some(1);
    let (broker, mut events, port) = running_broker(&config).await;

    // WHEN: A worker asks for pairing and nobody answers
    let mut worker = new_worker(&config);
    let result = worker.connect(Some(port), Some(placeholder("00016"))).await;

    // THEN: Refused, and the service is still running
    assert!(
        matches!(result, Err(LinkError::AuthenticationFailed { .. })),
        "Got {result:?}"
    );
    wait_for_approval_request(&mut events).await;
    assert!(broker.is_running());
}

/// **VALUE**: Verifies that approving or denying with nothing pending is a no-op.
#[tokio::test]
async fn given_nothing_pending_when_approving_then_returns_none_and_pairs_nothing() {
    // GIVEN: A running service with no pending approval
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, _events, _) = running_broker(&config).await;

    // WHEN: Approving and denying an unknown id
    let approved = broker.approve("00042").await.expect("reachable");
    let denied = broker.deny("00042").await.expect("reachable");

    // THEN: Nothing happened
    assert_eq!(approved, None);
    assert!(!denied);
    assert!(broker.paired_workers().await.expect("reachable").is_empty());

    broker.shutdown().await;
}

/// **VALUE**: Verifies that a worker hanging up during approval frees the service.
///
/// **WHY THIS MATTERS**: Approval has no timeout by default. Without watching
/// the pending socket, a worker that was killed while waiting would leave
/// the service stuck until a human answered, refusing every other worker.
#[tokio::test]
async fn given_pending_approval_when_worker_hangs_up_then_next_worker_is_accepted() {
    // GIVEN: A raw client waiting for approval
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, port) = running_broker(&config).await;
    let broker = Arc::new(broker);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
    stream
        .write_all(token::encode_token(&placeholder("00017")).as_bytes())
        .await
        .expect("write");
    assert_eq!(wait_for_approval_request(&mut events).await, "00017");

    // WHEN: The client goes away without an answer
    drop(stream);

    // THEN: The request is withdrawn and reported as a failure
    let failed = wait_for_event(&mut events, |e| {
        matches!(e, LinkEvent::AuthenticationFailed { .. })
    })
    .await;
    assert!(matches!(
        failed,
        LinkEvent::AuthenticationFailed { ref process_id, .. } if process_id == "00017"
    ));
    assert_eq!(broker.approve("00017").await.expect("reachable"), None);

    // THEN: The next worker is served
    let mut worker = new_worker(&config);
    pair_interactively(&broker, &mut events, &mut worker, port, "00018").await;
    assert!(worker.is_connected().await);
}
