//! Spawning worker processes with the link environment.

use crate::config::LauncherConfig;
use crate::error::link::LinkError;
use crate::token::encode_token;
use crate::{ENV_LINK_PORT, ENV_LINK_TOKEN};

use common::ErrorLocation;
use models::Token;

use std::env::current_exe;
use std::io::ErrorKind;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info};
use tokio::process::Child as TokioChild;
use tokio::process::Command as TokioCommand;

/// A worker process started by the broker.
#[derive(Debug)]
pub struct LaunchedWorker {
    /// Pre-authorized token handed to the worker, if the launch paired it.
    pub token: Option<Token>,
    pub child: TokioChild,
}

impl LaunchedWorker {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Command for `executable` carrying the port and (optionally) the token in
/// its environment. An inherited token variable is removed so an unpaired
/// worker falls back to the placeholder.
pub(crate) fn build_worker_command(
    executable: &Path,
    args: &[String],
    port: u16,
    token: Option<&Token>,
) -> TokioCommand {
    let mut cmd = TokioCommand::new(executable);
    cmd.args(args)
        .env(ENV_LINK_PORT, port.to_string())
        .stdin(Stdio::null());

    match token {
        Some(token) => {
            cmd.env(ENV_LINK_TOKEN, encode_token(token));
        }
        None => {
            cmd.env_remove(ENV_LINK_TOKEN);
        }
    }

    cmd
}

/// Spawn the configured worker executable.
///
/// The path is tried as given first; if that is not found, the same file name
/// is tried next to the current executable.
///
/// # Errors
///
/// - [`LinkError::WorkerExecutableMissing`] if no executable is configured or
///   neither location has it
/// - [`LinkError::Spawn`] for any other spawn failure
pub(crate) fn spawn_worker(
    launcher: &LauncherConfig,
    port: u16,
    token: Option<&Token>,
) -> Result<TokioChild, LinkError> {
    let executable = launcher
        .executable
        .as_deref()
        .ok_or_else(|| LinkError::worker_executable_missing("no worker executable configured"))?;

    debug!("Attempting to spawn worker {}", executable.display());

    match build_worker_command(executable, &launcher.args, port, token).spawn() {
        Ok(child) => {
            info!(
                "Spawned worker {} (PID: {:?})",
                executable.display(),
                child.id()
            );
            Ok(child)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(
                "{} not found, trying next to the current executable",
                executable.display()
            );
            spawn_local_worker(executable, launcher, port, token)
        }
        Err(err) => Err(spawn_error(executable, err)),
    }
}

fn spawn_local_worker(
    executable: &Path,
    launcher: &LauncherConfig,
    port: u16,
    token: Option<&Token>,
) -> Result<TokioChild, LinkError> {
    let local_path = local_candidate(executable).ok_or_else(|| {
        LinkError::worker_executable_missing(format!(
            "worker executable not found: {}",
            executable.display()
        ))
    })?;

    debug!("Attempting to spawn worker from {}", local_path.display());

    match build_worker_command(&local_path, &launcher.args, port, token).spawn() {
        Ok(child) => {
            info!(
                "Spawned worker {} (PID: {:?})",
                local_path.display(),
                child.id()
            );
            Ok(child)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            Err(LinkError::worker_executable_missing(format!(
                "worker executable not found: {} (also tried {})",
                executable.display(),
                local_path.display()
            )))
        }
        Err(err) => Err(spawn_error(&local_path, err)),
    }
}

fn local_candidate(executable: &Path) -> Option<PathBuf> {
    let file_name = executable.file_name()?;
    let exe = current_exe().ok()?;
    let candidate = exe.parent()?.join(file_name);
    (candidate != executable).then_some(candidate)
}

#[track_caller]
fn spawn_error(executable: &Path, err: std::io::Error) -> LinkError {
    LinkError::Spawn {
        message: format!("Failed to spawn {}: {err}", executable.display()),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(err),
    }
}
