use crate::APP_DIR_NAME;
use crate::error::config::ConfigError;
use crate::registry::PortRegistry;

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "link.toml";
const CONFIG_VERSION: u32 = 1;

// ============================================
// CONFIG STRUCTS
// ============================================

/// Settings of the listening side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Port to bind on loopback; 0 lets the OS pick a free one.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// How long a handshake waits for approve/deny. `None` waits until the
    /// host answers or the service stops.
    #[serde(default)]
    pub approval_timeout_secs: Option<u64>,
    /// Port record location; defaults to the per-user path.
    #[serde(default)]
    pub port_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 0,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            approval_timeout_secs: None,
            port_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_ensure_attempts")]
    pub ensure_attempts: u32,
    #[serde(default = "default_ensure_interval_ms")]
    pub ensure_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            ensure_attempts: default_ensure_attempts(),
            ensure_interval_ms: default_ensure_interval_ms(),
        }
    }
}

/// How the host starts worker processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Settings of the worker-side client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on waiting for the handshake reply, which includes the
    /// time a human takes to approve.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_secs: default_response_timeout_secs(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub launcher: LauncherConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            service: ServiceConfig::default(),
            broker: BrokerConfig::default(),
            launcher: LauncherConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_handshake_timeout_ms() -> u64 {
    5_000
}
fn default_ensure_attempts() -> u32 {
    5
}
fn default_ensure_interval_ms() -> u64 {
    1_000
}
fn default_connect_timeout_ms() -> u64 {
    3_000
}
fn default_response_timeout_secs() -> u64 {
    300
}
fn default_call_timeout_ms() -> u64 {
    2_000
}

// ============================================
// IMPLEMENTATION
// ============================================

/// Per-user directory holding `link.toml`, the port record and logs.
///
/// Falls back to the temp dir when the platform has no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

impl ServiceConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }

    pub fn registry(&self) -> PortRegistry {
        match &self.port_file {
            Some(path) => PortRegistry::new(path.clone()),
            None => PortRegistry::at_default_path(),
        }
    }
}

impl BrokerConfig {
    pub fn ensure_interval(&self) -> Duration {
        Duration::from_millis(self.ensure_interval_ms)
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl LinkConfig {
    /// Load config from {config_dir}/link.toml.
    ///
    /// # Returns
    ///
    /// Returns defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but is unreadable or invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Link config not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read link config: {}", e);
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: LinkConfig = toml::from_str(&contents).map_err(|e| {
            warn!("Failed to parse link config: {}", e);
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Link config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/link.toml using temp file + rename.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{}.tmp", CONFIG_FILE_NAME));

        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, contents).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Link config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{})",
                    self.version, CONFIG_VERSION
                ),
            });
        }

        if self.service.handshake_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "service.handshake_timeout_ms must be positive".to_string(),
            });
        }

        if self.broker.ensure_attempts == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "broker.ensure_attempts must be at least 1".to_string(),
            });
        }

        if self.client.connect_timeout_ms == 0 || self.client.call_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "client timeouts must be positive".to_string(),
            });
        }

        if let Some(ref executable) = self.launcher.executable {
            if executable.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError {
                    location: ErrorLocation::from(Location::caller()),
                    reason: "launcher.executable cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
