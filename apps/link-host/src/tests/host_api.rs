use crate::host_api::{HOST_INFO_METHOD, HOST_LOG_METHOD, HostApi};
use crate::worker_api::{WORKER_ECHO_METHOD, WORKER_INFO_METHOD, WorkerApi};

use link_core::link::CallHandler;

use serde_json::{Value, json};

/// **VALUE**: Verifies that host.info identifies this process.
#[test]
fn given_host_api_when_info_called_then_returns_name_and_pid() {
    // GIVEN: A host API
    let api = HostApi::new();

    // WHEN: Calling host.info
    let info = api.handle(HOST_INFO_METHOD, Value::Null).expect("info");

    // THEN: Name and pid
    assert_eq!(info["name"], json!("link-host"));
    assert_eq!(info["pid"], json!(std::process::id()));
}

/// **VALUE**: Verifies that host.log records worker messages.
#[test]
fn given_log_request_when_handled_then_message_is_recorded() {
    // GIVEN: A host API
    let api = HostApi::new();

    // WHEN: A worker reports two messages
    api.handle(
        HOST_LOG_METHOD,
        json!({ "process_id": "00001", "message": "scene loaded" }),
    )
    .expect("first report");
    api.handle(
        HOST_LOG_METHOD,
        json!({ "level": "warn", "message": "missing texture" }),
    )
    .expect("second report");

    // THEN: Both are kept in order
    assert_eq!(api.reports(), vec!["scene loaded", "missing texture"]);
}

/// **VALUE**: Verifies that malformed requests are answered with an error.
#[test]
fn given_log_request_without_message_when_handled_then_returns_error() {
    // GIVEN: A host API
    let api = HostApi::new();

    // WHEN: Sending a log request without a message
    let result = api.handle(HOST_LOG_METHOD, json!({ "level": "info" }));

    // THEN: An error, nothing recorded
    assert!(result.is_err());
    assert!(api.reports().is_empty());
}

/// **VALUE**: Verifies that unknown methods are rejected on both sides.
#[test]
fn given_unknown_method_when_handled_then_returns_error() {
    // GIVEN: Both APIs
    let host = HostApi::new();
    let worker = WorkerApi;

    // WHEN/THEN: Unknown methods are refused with their name
    let host_error = host.handle("host.nope", Value::Null).expect_err("unknown");
    let worker_error = worker.handle("worker.nope", Value::Null).expect_err("unknown");
    assert!(host_error.contains("host.nope"));
    assert!(worker_error.contains("worker.nope"));
}

/// **VALUE**: Verifies the worker API surface.
#[test]
fn given_worker_api_when_called_then_answers_info_and_echo() {
    // GIVEN: A worker API
    let api = WorkerApi;

    // WHEN: Calling info and echo
    let info = api.handle(WORKER_INFO_METHOD, Value::Null).expect("info");
    let echoed = api
        .handle(WORKER_ECHO_METHOD, json!({ "frame": 12 }))
        .expect("echo");

    // THEN: Expected payloads
    assert_eq!(info["name"], json!("link-worker"));
    assert_eq!(echoed, json!({ "frame": 12 }));
}
