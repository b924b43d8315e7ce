//! Link secrets with redacted Debug output.

use crate::{ErrorLocation, RedactError};

use std::fmt;
use std::panic::Location;

use serde::ser::Error;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// A pairing secret that never exposes its value in logs or debug output.
///
/// Equality is checked in constant time so handshake validation does not leak
/// how many leading characters of a guessed secret were correct.
#[derive(Clone)]
pub struct RedactedSecret {
    inner: String,
}

impl RedactedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: secret.into(),
        }
    }

    /// Get the actual secret value.
    ///
    /// # Security Note
    /// Only call this when writing the token to the wire or comparing it.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Get the secret length (safe to log).
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// True if every character of the secret is `fill`.
    pub fn is_filled_with(&self, fill: char) -> bool {
        !self.inner.is_empty() && self.inner.chars().all(|c| c == fill)
    }
}

impl PartialEq for RedactedSecret {
    fn eq(&self, other: &Self) -> bool {
        let ours = self.inner.as_bytes();
        let theirs = other.inner.as_bytes();

        ours.len() == theirs.len() && bool::from(ours.ct_eq(theirs))
    }
}

impl Eq for RedactedSecret {}

impl fmt::Debug for RedactedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedactedSecret([REDACTED])")
    }
}

impl fmt::Display for RedactedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED SECRET]")
    }
}

impl Drop for RedactedSecret {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

// Prevent accidental serialization
impl serde::Serialize for RedactedSecret {
    fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Err(S::Error::custom(RedactError::Serialization {
            message: String::from("RedactedSecret cannot be serialized - use as_str() explicitly"),
            location: ErrorLocation::from(Location::caller()),
        }))
    }
}
