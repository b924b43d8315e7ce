//! Shared building blocks for the Blender Link workspace.
//!
//! ## Architecture
//!
//! - **common** (this crate): error location tracking and secret handling
//! - **models**: pure link data (tokens, sessions, events)
//! - **link-core**: the link service, broker and worker client
//! - **link-host**: application wiring (logging, approval prompt, binaries)

pub mod error;
pub mod redacted_secret;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_secret::RedactedSecret;

#[cfg(test)]
mod tests;
