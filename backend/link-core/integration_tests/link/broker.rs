use super::helpers::{new_broker, running_broker, test_config, wait_for_event};

use link_core::error::LinkError;

use models::{LinkEvent, LinkState};

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

/// **VALUE**: Verifies that a new broker starts with the service stopped.
#[tokio::test]
async fn given_new_broker_when_inspected_then_service_is_stopped() {
    // GIVEN/WHEN: A fresh broker
    let dir = TempDir::new().expect("temp dir");
    let broker = new_broker(&test_config(&dir));

    // THEN: Stopped, no port, nothing paired
    assert_eq!(broker.session().state, LinkState::Stopped);
    assert_eq!(broker.port(), None);
    assert!(!broker.is_running());
    assert!(broker.paired_workers().await.expect("reachable").is_empty());

    broker.shutdown().await;
}

/// **VALUE**: Verifies that ensure_running starts the service and reports it.
#[tokio::test]
async fn given_stopped_service_when_ensure_running_then_returns_true() {
    // GIVEN: A stopped broker
    let dir = TempDir::new().expect("temp dir");
    let broker = new_broker(&test_config(&dir));

    // WHEN: Ensuring it runs with explicit polling parameters
    let running = broker
        .ensure_running_with(10, Duration::from_millis(50))
        .await;

    // THEN: Listening
    assert!(running);
    assert!(broker.port().is_some());

    broker.shutdown().await;
}

/// **VALUE**: Verifies that a port that cannot be bound is reported, not fatal.
///
/// **WHY THIS MATTERS**: The host must stay usable when the configured port is
/// taken; the link simply stays down.
#[tokio::test]
async fn given_taken_port_when_ensure_running_then_returns_false() {
    // GIVEN: A port already held by another listener
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let dir = TempDir::new().expect("temp dir");
    let mut config = test_config(&dir);
    config.service.port = blocker.local_addr().expect("addr").port();
    let broker = new_broker(&config);

    // WHEN: Trying to start
    let running = broker
        .ensure_running_with(2, Duration::from_millis(100))
        .await;

    // THEN: Not running, and the broker still answers
    assert!(!running);
    assert_eq!(broker.session().state, LinkState::Stopped);
    assert!(broker.paired_workers().await.is_ok());

    broker.shutdown().await;
}

/// **VALUE**: Verifies that launching without a configured worker fails early.
#[tokio::test]
async fn given_no_worker_executable_when_launching_then_returns_missing_and_stays_stopped() {
    // GIVEN: A broker without launcher settings
    let dir = TempDir::new().expect("temp dir");
    let broker = new_broker(&test_config(&dir));

    // WHEN: Launching
    let result = broker.launch_worker(true).await;

    // THEN: WorkerExecutableMissing, and the service was not started for nothing
    assert!(
        matches!(result, Err(LinkError::WorkerExecutableMissing { .. })),
        "Got {result:?}"
    );
    assert!(!broker.is_running());

    broker.shutdown().await;
}

/// **VALUE**: Verifies that a failed launch revokes the pre-authorization.
///
/// **BUG THIS CATCHES**: A pairing left behind for a worker that never started
/// would hold its process id and a live secret until the service stops.
#[tokio::test]
async fn given_missing_worker_binary_when_launching_paired_then_pairing_is_revoked() {
    // GIVEN: A broker configured with a nonexistent worker
    let dir = TempDir::new().expect("temp dir");
    let mut config = test_config(&dir);
    config.launcher.executable = Some(PathBuf::from(
        "/nonexistent/blender-link/worker-that-does-not-exist",
    ));
    let broker = new_broker(&config);

    // WHEN: Launching with auto pairing
    let result = broker.launch_worker(true).await;

    // THEN: Missing executable, service running, nothing paired
    assert!(
        matches!(result, Err(LinkError::WorkerExecutableMissing { .. })),
        "Got {result:?}"
    );
    assert!(broker.is_running());
    assert!(broker.paired_workers().await.expect("reachable").is_empty());

    broker.shutdown().await;
}

/// **VALUE**: Verifies that a launched worker receives the port and its
/// pre-authorized token, and that the token is trusted.
#[cfg(unix)]
#[tokio::test]
async fn given_auto_pair_when_launching_then_worker_env_has_port_and_trusted_token() {
    // GIVEN: A "worker" that writes its link environment to a file
    let dir = TempDir::new().expect("temp dir");
    let out = dir.path().join("env.txt");
    let mut config = test_config(&dir);
    config.launcher.executable = Some(PathBuf::from("/bin/sh"));
    config.launcher.args = vec![
        "-c".to_string(),
        format!(
            "printf '%s %s' \"$BLENDER_LINK_PORT\" \"$BLENDER_LINK_TOKEN\" > '{}'",
            out.display()
        ),
    ];
    let broker = new_broker(&config);

    // WHEN: Launching with auto pairing and waiting for it to exit
    let mut launched = broker.launch_worker(true).await.expect("launch succeeds");
    let status = launched.child.wait().await.expect("worker exits");

    // THEN: The worker saw the port and the same token the broker returned
    assert!(status.success());
    let token = launched.token.expect("auto pair mints a token");
    let written = std::fs::read_to_string(&out).expect("worker wrote env");
    let port = broker.port().expect("running");
    assert_eq!(
        written,
        format!(
            "{} {}",
            port,
            link_core::token::encode_token(&token)
        )
    );

    // THEN: The service trusts it
    assert_eq!(
        broker.paired_workers().await.expect("reachable"),
        vec![token.process_id().to_string()]
    );

    broker.shutdown().await;
}

/// **VALUE**: Verifies that an unpaired launch hands out no token.
#[cfg(unix)]
#[tokio::test]
async fn given_no_auto_pair_when_launching_then_worker_has_no_token() {
    // GIVEN: A worker that records whether a token variable is set
    let dir = TempDir::new().expect("temp dir");
    let out = dir.path().join("env.txt");
    let mut config = test_config(&dir);
    config.launcher.executable = Some(PathBuf::from("/bin/sh"));
    config.launcher.args = vec![
        "-c".to_string(),
        format!(
            "printf '%s' \"${{BLENDER_LINK_TOKEN-unset}}\" > '{}'",
            out.display()
        ),
    ];
    let broker = new_broker(&config);

    // WHEN: Launching without pairing
    let mut launched = broker.launch_worker(false).await.expect("launch succeeds");
    launched.child.wait().await.expect("worker exits");

    // THEN: No token in either place
    assert!(launched.token.is_none());
    assert_eq!(
        std::fs::read_to_string(&out).expect("worker wrote env"),
        "unset"
    );
    assert!(broker.paired_workers().await.expect("reachable").is_empty());

    broker.shutdown().await;
}

/// **VALUE**: Verifies that shutdown stops a running service and clears the
/// port record.
#[tokio::test]
async fn given_running_broker_when_shut_down_then_service_stops() {
    // GIVEN: A running broker
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let (broker, mut events, _) = running_broker(&config).await;

    // WHEN: Shutting down
    broker.shutdown().await;

    // THEN: Stopped was announced and the record is empty
    wait_for_event(&mut events, |e| matches!(e, LinkEvent::Stopped)).await;
    let contents = std::fs::read_to_string(dir.path().join("blender_link.json")).expect("file");
    assert_eq!(contents.trim(), "{}");
}
