//! On-disk port record used by workers to discover the link service.
//!
//! The service is the only writer. Workers that were launched with the port
//! in their environment never need to read it.

use crate::PORT_FILE_NAME;
use crate::config::default_config_dir;
use crate::error::registry::RegistryError;

use common::ErrorLocation;
use models::PortRecord;

use std::fs;
use std::io::ErrorKind;
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{debug, info};

#[derive(Debug, Clone)]
pub struct PortRegistry {
    path: PathBuf,
}

impl PortRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Registry at the well-known per-user location.
    pub fn at_default_path() -> Self {
        Self::new(Self::default_path())
    }

    /// `{config_dir}/blender-link/blender_link.json`.
    pub fn default_path() -> PathBuf {
        default_config_dir().join(PORT_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded port.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the file is missing or records no port.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the file exists but cannot be read or parsed.
    pub fn read(&self) -> Result<Option<u16>, RegistryError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No port record at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(RegistryError::Read {
                    location: ErrorLocation::from(Location::caller()),
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let record: PortRecord =
            serde_json::from_str(&contents).map_err(|e| RegistryError::Parse {
                location: ErrorLocation::from(Location::caller()),
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        Ok(record.port)
    }

    /// Overwrite the record using temp file + rename.
    pub fn write(&self, port: Option<u16>) -> Result<(), RegistryError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| RegistryError::Write {
                location: ErrorLocation::from(Location::caller()),
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let record = PortRecord { port };
        let json = serde_json::to_string(&record).map_err(|e| RegistryError::Serialize {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        let temp_path = self.path.with_extension("json.tmp");

        fs::write(&temp_path, json).map_err(|e| RegistryError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| RegistryError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: self.path.clone(),
            source: e,
        })?;

        info!("Port record updated at {}: {:?}", self.path.display(), port);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), RegistryError> {
        self.write(None)
    }
}
