use serde::{Deserialize, Serialize};

/// On-disk record of the port the link service is bound to.
///
/// Serializes to `{}` when the service is not running and `{"port": n}`
/// while it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl PortRecord {
    pub fn running(port: u16) -> Self {
        Self { port: Some(port) }
    }

    pub fn empty() -> Self {
        Self { port: None }
    }
}
