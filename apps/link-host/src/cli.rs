//! Command line arguments of the host and worker binaries.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "link-host", version, about = "Demo host for the Blender link")]
pub struct HostArgs {
    /// Directory holding link.toml and logs (default: per-user config dir)
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Number of workers to launch at startup
    #[arg(long, default_value_t = 1)]
    pub workers: u32,

    /// Hand launched workers a pre-authorized token instead of asking
    #[arg(long)]
    pub auto_pair: bool,

    /// Approve every pairing request without prompting
    #[arg(long)]
    pub auto_approve: bool,
}

#[derive(Debug, Parser)]
#[command(name = "link-worker", version, about = "Demo worker for the Blender link")]
pub struct WorkerArgs {
    /// Directory holding link.toml and logs (default: per-user config dir)
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Service port; defaults to BLENDER_LINK_PORT, then the port record
    #[arg(long)]
    pub port: Option<u16>,

    /// Token; defaults to BLENDER_LINK_TOKEN, then a placeholder
    #[arg(long)]
    pub token: Option<String>,

    /// Seconds between liveness checks
    #[arg(long, default_value_t = 1)]
    pub poll_secs: u64,
}
