//! Operations a demo worker exposes to the host.

use link_core::link::CallHandler;

use serde_json::{Value, json};

pub const WORKER_INFO_METHOD: &str = "worker.info";
pub const WORKER_ECHO_METHOD: &str = "worker.echo";

#[derive(Debug, Default)]
pub struct WorkerApi;

impl CallHandler for WorkerApi {
    fn handle(&self, method: &str, params: Value) -> Result<Value, String> {
        match method {
            WORKER_INFO_METHOD => Ok(json!({
                "name": "link-worker",
                "version": env!("CARGO_PKG_VERSION"),
                "pid": std::process::id(),
            })),
            WORKER_ECHO_METHOD => Ok(params),
            other => Err(format!("unknown method '{other}'")),
        }
    }
}
