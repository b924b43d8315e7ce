use serde::Serialize;

/// Lifecycle of the link service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Stopped,
    Starting,
    Listening,
}

/// Snapshot of the link service as seen from the host.
///
/// Published by the service after every transition; the port is only set
/// while listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkSession {
    pub state: LinkState,
    pub port: Option<u16>,
}

impl LinkSession {
    pub const fn stopped() -> Self {
        Self {
            state: LinkState::Stopped,
            port: None,
        }
    }

    pub const fn starting() -> Self {
        Self {
            state: LinkState::Starting,
            port: None,
        }
    }

    pub const fn listening(port: u16) -> Self {
        Self {
            state: LinkState::Listening,
            port: Some(port),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state == LinkState::Listening
    }
}

impl Default for LinkSession {
    fn default() -> Self {
        Self::stopped()
    }
}
