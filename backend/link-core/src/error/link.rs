//! Error types for the link service, broker and worker client.
//!
//! Authentication failures are deliberately a distinct variant: the service
//! reports them as events and keeps accepting, and the worker client uses
//! them to decide whether to retry with the placeholder token.

use common::ErrorLocation;
use models::ModelError;

use std::error::Error as StdError;
use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum LinkError {
    #[error("Malformed Token Error: {message} {location}")]
    MalformedToken {
        message: String,
        location: ErrorLocation,
    },

    #[error("Authentication Error: process '{process_id}': {message} {location}")]
    AuthenticationFailed {
        process_id: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("No Free Process ID Error: all process ids are in use {location}")]
    NoFreeProcessId { location: ErrorLocation },

    #[error("Worker Executable Missing Error: {message} {location}")]
    WorkerExecutableMissing {
        message: String,
        location: ErrorLocation,
    },

    #[error("Spawn Error: {message} {location}")]
    Spawn {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Service Unavailable Error: {message} {location}")]
    ServiceUnavailable {
        message: String,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },

    #[error("Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protocol Error: {message} {location}")]
    Protocol {
        message: String,
        location: ErrorLocation,
    },

    #[error("Remote Call Error: '{method}': {message} {location}")]
    Rpc {
        method: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Channel Closed Error: {location}")]
    ChannelClosed { location: ErrorLocation },
}

impl LinkError {
    #[track_caller]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        LinkError::MalformedToken {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn authentication_failed(
        process_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        LinkError::AuthenticationFailed {
            process_id: process_id.into(),
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn no_free_process_id() -> Self {
        LinkError::NoFreeProcessId {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn worker_executable_missing(message: impl Into<String>) -> Self {
        LinkError::WorkerExecutableMissing {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        LinkError::ServiceUnavailable {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn timeout(message: impl Into<String>) -> Self {
        LinkError::Timeout {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn protocol(message: impl Into<String>) -> Self {
        LinkError::Protocol {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn rpc(method: impl Into<String>, message: impl Into<String>) -> Self {
        LinkError::Rpc {
            method: method.into(),
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn channel_closed() -> Self {
        LinkError::ChannelClosed {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// True for failures the handshake reports as an authentication problem.
    ///
    /// A malformed token counts: the server cannot tell a garbled token from
    /// a forged one.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            LinkError::AuthenticationFailed { .. } | LinkError::MalformedToken { .. }
        )
    }

    /// Get error category for logging.
    pub fn error_category(&self) -> &'static str {
        match self {
            LinkError::MalformedToken { .. } => "malformed_token",
            LinkError::AuthenticationFailed { .. } => "authentication",
            LinkError::NoFreeProcessId { .. } => "no_free_process_id",
            LinkError::WorkerExecutableMissing { .. } => "worker_missing",
            LinkError::Spawn { .. } => "spawn",
            LinkError::ServiceUnavailable { .. } => "service_unavailable",
            LinkError::Io { .. } => "io",
            LinkError::Timeout { .. } => "timeout",
            LinkError::Protocol { .. } => "protocol",
            LinkError::Rpc { .. } => "rpc",
            LinkError::ChannelClosed { .. } => "channel_closed",
        }
    }
}

impl From<IoError> for LinkError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        LinkError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<serde_json::Error> for LinkError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        LinkError::Protocol {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<ModelError> for LinkError {
    #[track_caller]
    fn from(error: ModelError) -> Self {
        match error {
            ModelError::Validation { message, .. } => LinkError::MalformedToken {
                message,
                location: ErrorLocation::from(Location::caller()),
            },
        }
    }
}
