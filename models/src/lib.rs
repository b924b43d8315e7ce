//! Domain models for Blender Link.
//!
//! This crate contains pure data structures shared by the link service, the
//! host-facing broker and the worker client. Models carry validation but no
//! I/O - sockets, files and processes live in `link-core`.

pub mod error;
pub mod event;
pub mod port_record;
pub mod session;
pub mod token;

pub use common::ErrorLocation;
pub use error::model_error::ModelError;
pub use event::LinkEvent;
pub use port_record::PortRecord;
pub use session::{LinkSession, LinkState};
pub use token::builder::TokenBuilder;
pub use token::{
    MAX_PROCESS_ID, PLACEHOLDER_CHAR, PROCESS_ID_WIDTH, SECRET_LENGTH, TOKEN_LENGTH,
    TOKEN_SEPARATOR, Token,
};

#[cfg(test)]
mod tests;
