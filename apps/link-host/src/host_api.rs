//! Operations the host exposes to connected workers.

use link_core::link::CallHandler;

use std::sync::{Mutex, PoisonError};

use log::{Level, debug, log};
use serde::Deserialize;
use serde_json::{Value, json};

pub const HOST_INFO_METHOD: &str = "host.info";
pub const HOST_LOG_METHOD: &str = "host.log";

const HOST_NAME: &str = "link-host";

#[derive(Debug, Deserialize)]
struct LogRequest {
    #[serde(default)]
    process_id: Option<String>,
    #[serde(default)]
    level: Option<String>,
    message: String,
}

/// Host side of the link API.
///
/// Keeps the messages workers report so the host UI (or a test) can show them.
#[derive(Debug, Default)]
pub struct HostApi {
    reports: Mutex<Vec<String>>,
}

impl HostApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received through `host.log`, oldest first.
    pub fn reports(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn info(&self) -> Value {
        json!({
            "name": HOST_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "pid": std::process::id(),
        })
    }

    fn record(&self, params: Value) -> Result<Value, String> {
        let request: LogRequest =
            serde_json::from_value(params).map_err(|e| format!("invalid log request: {e}"))?;

        let level = match request.level.as_deref() {
            Some("error") => Level::Error,
            Some("warn") => Level::Warn,
            Some("debug") => Level::Debug,
            _ => Level::Info,
        };

        let origin = request.process_id.as_deref().unwrap_or("unknown");
        log!(level, "[worker {}] {}", origin, request.message);

        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.message);

        Ok(Value::Null)
    }
}

impl CallHandler for HostApi {
    fn handle(&self, method: &str, params: Value) -> Result<Value, String> {
        debug!("Worker called {}", method);

        match method {
            HOST_INFO_METHOD => Ok(self.info()),
            HOST_LOG_METHOD => self.record(params),
            other => Err(format!("unknown method '{other}'")),
        }
    }
}
