//! End-to-end tests that launch the real `link-worker` binary.

use link_host::host_api::HostApi;
use link_host::worker_api::WORKER_INFO_METHOD;

use link_core::config::LinkConfig;
use link_core::link::{LaunchedWorker, LinkBroker};

use models::{LinkEvent, Token};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::{sleep as TokioSleep, timeout as TokioTimeout};

const STEP_TIMEOUT: Duration = Duration::from_secs(30);

fn worker_config(dir: &TempDir) -> LinkConfig {
    let mut config = LinkConfig::default();
    config.service.port_file = Some(dir.path().join("blender_link.json"));
    config.broker.ensure_attempts = 20;
    config.broker.ensure_interval_ms = 100;
    config.launcher.executable = Some(PathBuf::from(env!("CARGO_BIN_EXE_link-worker")));
    config.launcher.args = vec![
        "--config-dir".to_string(),
        dir.path().display().to_string(),
    ];
    config
}

async fn wait_for_connected(events: &mut broadcast::Receiver<LinkEvent>) -> Token {
    let waited = TokioTimeout(STEP_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(LinkEvent::ClientConnected { token }) => return token,
                Ok(_) => continue,
                Err(e) => panic!("Event stream failed: {e}"),
            }
        }
    })
    .await;
    waited.expect("Worker never connected")
}

async fn wait_for_report(host_api: &HostApi, expected: &str) {
    let waited = TokioTimeout(STEP_TIMEOUT, async {
        while !host_api.reports().iter().any(|r| r == expected) {
            TokioSleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "Worker never reported {expected:?}");
}

/// Revoke the worker and check it leaves on its own.
async fn disconnect_and_reap(broker: &LinkBroker, worker: &mut LaunchedWorker, process_id: &str) {
    assert!(broker.disconnect_worker(process_id).await.expect("reachable"));

    let status = TokioTimeout(STEP_TIMEOUT, worker.child.wait())
        .await
        .expect("Worker should exit after being disconnected")
        .expect("wait succeeds");
    assert!(status.success(), "Worker exited with {status}");
}

/// **VALUE**: Verifies the whole pre-paired flow against the real worker binary.
///
/// **WHY THIS MATTERS**: This is the path the host takes for every worker it
/// launches itself: environment hand-off, handshake, calls both ways, teardown.
#[tokio::test]
async fn given_auto_pair_when_worker_launched_then_links_without_approval() {
    // GIVEN: A broker configured to launch the worker binary
    let dir = TempDir::new().expect("temp dir");
    let host_api = Arc::new(HostApi::new());
    let broker = LinkBroker::new(worker_config(&dir), host_api.clone()).expect("broker");
    let mut events = broker.subscribe();

    // WHEN: Launching with a pre-authorized token
    let mut worker = broker.launch_worker(true).await.expect("launch");
    let issued = worker.token.clone().expect("auto pair issues a token");

    // THEN: The worker connects with exactly that token
    let connected = wait_for_connected(&mut events).await;
    assert_eq!(connected, issued);

    // THEN: Worker -> host call arrived
    wait_for_report(&host_api, "worker ready").await;

    // THEN: Host -> worker call answers from the worker process
    let info = broker
        .call_worker(issued.process_id(), WORKER_INFO_METHOD, Value::Null)
        .await
        .expect("worker answers");
    assert_eq!(info["name"], json!("link-worker"));
    assert_eq!(info["pid"], json!(worker.pid().expect("running child")));

    // THEN: Disconnecting lets the worker exit cleanly
    disconnect_and_reap(&broker, &mut worker, issued.process_id()).await;

    broker.shutdown().await;
}

/// **VALUE**: Verifies the interactive pairing flow against the real worker binary.
#[tokio::test]
async fn given_no_auto_pair_when_worker_launched_then_pairs_after_approval() {
    // GIVEN: A broker configured to launch the worker binary
    let dir = TempDir::new().expect("temp dir");
    let host_api = Arc::new(HostApi::new());
    let broker = LinkBroker::new(worker_config(&dir), host_api.clone()).expect("broker");
    let mut events = broker.subscribe();

    // WHEN: Launching without a token and approving the request
    let mut worker = broker.launch_worker(false).await.expect("launch");
    assert!(worker.token.is_none());

    let requested = TokioTimeout(STEP_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(LinkEvent::ApprovalRequested { process_id }) => return process_id,
                Ok(_) => continue,
                Err(e) => panic!("Event stream failed: {e}"),
            }
        }
    })
    .await
    .expect("Worker never asked for approval");
    let minted = broker
        .approve(&requested)
        .await
        .expect("reachable")
        .expect("approval was pending");

    // THEN: The worker connects with the minted token
    let connected = wait_for_connected(&mut events).await;
    assert_eq!(connected, minted);
    wait_for_report(&host_api, "worker ready").await;

    // THEN: It leaves cleanly when disconnected
    disconnect_and_reap(&broker, &mut worker, &requested).await;

    broker.shutdown().await;
}
