// Library exports for testing
// Both binaries (main.rs, bin/link_worker.rs) import these as well

pub mod cli;
pub mod error;
pub mod host_api;
pub mod logger;
pub mod prompt;
pub mod worker_api;

#[cfg(test)]
mod tests;

/// Name of the worker binary shipped next to the host.
pub const WORKER_BINARY: &str = const_format::concatcp!("link-worker", std::env::consts::EXE_SUFFIX);
