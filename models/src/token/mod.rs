//! Worker identity tokens.
//!
//! A token is `<process-id>:<secret>` where the process id is a zero-padded
//! five digit number and the secret is a fixed-length hex string. The total
//! length is fixed so the handshake can read an exact number of bytes.

pub mod builder;

use crate::ModelError;
use crate::TokenBuilder;

use common::RedactedSecret;

/// Width of the zero-padded process id.
pub const PROCESS_ID_WIDTH: usize = 5;

/// Length of the hex secret.
pub const SECRET_LENGTH: usize = 32;

/// Separator between process id and secret.
pub const TOKEN_SEPARATOR: char = ':';

/// Length of an encoded token on the wire.
pub const TOKEN_LENGTH: usize = PROCESS_ID_WIDTH + 1 + SECRET_LENGTH;

/// Largest process id handed out to workers.
pub const MAX_PROCESS_ID: u32 = 65_535;

/// Fill character of the placeholder secret.
pub const PLACEHOLDER_CHAR: char = '*';

/// Identity of a worker for the lifetime of one link session.
///
/// Debug output shows the process id only; the secret is redacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub(crate) process_id: String,
    pub(crate) secret: RedactedSecret,
}

impl Token {
    /// Token announcing a worker that has never been paired.
    #[track_caller]
    pub fn placeholder(process_id: impl Into<String>) -> Result<Self, ModelError> {
        TokenBuilder::default()
            .with_process_id(process_id)
            .with_secret(placeholder_secret())
            .build()
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn secret(&self) -> &RedactedSecret {
        &self.secret
    }

    /// True if this token carries the placeholder secret and must go
    /// through interactive approval.
    pub fn is_placeholder(&self) -> bool {
        self.secret.is_filled_with(PLACEHOLDER_CHAR)
    }
}

/// The placeholder secret: [`PLACEHOLDER_CHAR`] repeated to [`SECRET_LENGTH`].
pub fn placeholder_secret() -> String {
    PLACEHOLDER_CHAR.to_string().repeat(SECRET_LENGTH)
}
