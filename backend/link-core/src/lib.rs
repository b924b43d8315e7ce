pub mod config;
pub mod error;
pub mod link;
pub mod registry;
pub mod token;

#[cfg(test)]
mod tests;

pub const LINK_HOSTNAME: &str = "127.0.0.1";
pub const LINK_BIND_ADDRESS: &str = const_format::concatcp!(LINK_HOSTNAME, ":");

/// Environment variable carrying the service port to a launched worker.
pub const ENV_LINK_PORT: &str = "BLENDER_LINK_PORT";

/// Environment variable carrying the initial token to a launched worker.
pub const ENV_LINK_TOKEN: &str = "BLENDER_LINK_TOKEN";

pub const APP_DIR_NAME: &str = "blender-link";
pub const PORT_FILE_NAME: &str = "blender_link.json";
