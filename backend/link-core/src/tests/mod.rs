mod auth_table;
mod config;
mod handshake;
mod launch;
mod registry;
mod token;
