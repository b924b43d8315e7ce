use common::ErrorLocation;

use link_core::error::{ConfigError, LinkError};

use std::panic::Location;

use thiserror::Error;

/// Errors surfaced by the demo host and worker binaries.
///
/// Library errors are flattened to their message here; the location is where
/// the binary received them.
#[derive(Debug, Error)]
pub enum HostError {
    /// Error from this app
    #[error("Host Error: {message} {location}")]
    Host {
        message: String,
        location: ErrorLocation,
    },

    /// Error from link-core (service, broker, worker client)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// Failed to load or save link.toml
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },
}

impl HostError {
    #[track_caller]
    pub fn host(message: impl Into<String>) -> Self {
        HostError::Host {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<LinkError> for HostError {
    #[track_caller]
    fn from(error: LinkError) -> Self {
        HostError::Core {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<ConfigError> for HostError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        HostError::Config {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
