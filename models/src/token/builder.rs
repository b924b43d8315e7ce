use crate::error::model_error::ModelError;
use crate::token::{PLACEHOLDER_CHAR, PROCESS_ID_WIDTH, SECRET_LENGTH, Token};
use crate::ErrorLocation;

use common::RedactedSecret;

use std::panic::Location;

/// Builder for creating validated [`Token`] instances.
///
/// A built token always encodes to exactly `TOKEN_LENGTH` ASCII bytes.
#[derive(Debug, Default)]
pub struct TokenBuilder {
    process_id: Option<String>,
    secret: Option<String>,
}

impl TokenBuilder {
    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = Some(process_id.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Build the Token with validation.
    #[track_caller]
    pub fn build(self) -> Result<Token, ModelError> {
        let process_id = self.process_id.ok_or_else(|| ModelError::Validation {
            message: String::from("Process ID is required"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        if process_id.len() != PROCESS_ID_WIDTH
            || !process_id.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ModelError::Validation {
                message: format!("Process ID must be exactly {PROCESS_ID_WIDTH} digits"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let secret = self.secret.ok_or_else(|| ModelError::Validation {
            message: String::from("Secret is required"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let secret = RedactedSecret::new(secret);

        if secret.len() != SECRET_LENGTH {
            return Err(ModelError::Validation {
                message: format!(
                    "Secret must be {SECRET_LENGTH} characters, got {}",
                    secret.len()
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let is_hex = secret.as_str().chars().all(|c| c.is_ascii_hexdigit());
        if !is_hex && !secret.is_filled_with(PLACEHOLDER_CHAR) {
            return Err(ModelError::Validation {
                message: String::from("Secret must be hex or the placeholder"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(Token { process_id, secret })
    }
}
