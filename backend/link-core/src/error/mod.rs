pub mod config;
pub mod link;
pub mod registry;

pub use config::ConfigError;
pub use link::LinkError;
pub use registry::RegistryError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Link(#[from] link::LinkError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Registry(#[from] registry::RegistryError),
}
