mod error;
mod host_api;
mod prompt;
