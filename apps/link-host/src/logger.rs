//! fern setup shared by `link-host` and `link-worker`.
//!
//! Each binary logs to colored stdout and to its own plain file under
//! `{config_dir}/logs`. Only the first [`initialize`] call installs anything.

use crate::error::HostError;

use std::fmt::{Arguments, Display};
use std::fs::{File, create_dir_all};
use std::io::stdout;
use std::path::Path;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use fern::{Dispatch, FormatCallback};
use humantime::format_rfc3339;
use log::{LevelFilter, Record, info, warn};

pub const LOG_DIR_NAME: &str = "logs";
pub const HOST_LOG_FILE: &str = "link-host.log";
pub const WORKER_LOG_FILE: &str = "link-worker.log";

static INSTALL: Once = Once::new();
static REQUESTED: AtomicBool = AtomicBool::new(false);

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Route `log` output to stdout and `{log_dir}/{file_name}`.
///
/// Repeat calls warn and return Ok.
///
/// # Errors
///
/// Returns [`HostError::Host`] if the log file cannot be opened or another
/// global logger is already installed.
pub fn initialize(log_dir: &Path, file_name: &str) -> Result<(), HostError> {
    if REQUESTED.swap(true, Ordering::SeqCst) {
        warn!("Link logger already set up, keeping the first configuration");
        return Ok(());
    }

    let mut result = Ok(());
    INSTALL.call_once(|| {
        result = install(log_dir, file_name);
    });

    if result.is_ok() {
        info!(
            "Logging at {:?} to {}",
            LOG_LEVEL,
            log_dir.join(file_name).display()
        );
    }
    result
}

/// Create `log_dir` if needed and open `file_name` in it for appending.
#[track_caller]
pub(crate) fn open_log_file(log_dir: &Path, file_name: &str) -> Result<File, HostError> {
    create_dir_all(log_dir).map_err(|e| {
        HostError::host(format!(
            "Failed to create log directory {}: {e}",
            log_dir.display()
        ))
    })?;

    fern::log_file(log_dir.join(file_name))
        .map_err(|e| HostError::host(format!("Failed to create log file: {e}")))
}

fn write_line(out: FormatCallback, message: &Arguments, record: &Record, level: &dyn Display) {
    out.finish(format_args!(
        "[{} - {}] {} [{}:{}]",
        format_rfc3339(SystemTime::now()),
        level,
        message,
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
    ))
}

#[track_caller]
fn install(log_dir: &Path, file_name: &str) -> Result<(), HostError> {
    let log_file = open_log_file(log_dir, file_name)?;

    let colors = ColoredLevelConfig::new()
        .trace(Magenta)
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red);

    let console = Dispatch::new()
        .format(move |out, message, record| {
            write_line(out, message, record, &colors.color(record.level()))
        })
        .chain(stdout());

    let file = Dispatch::new()
        .format(|out, message, record| write_line(out, message, record, &record.level()))
        .chain(log_file);

    Dispatch::new()
        .level(LOG_LEVEL)
        .chain(console)
        .chain(file)
        .apply()
        .map_err(|e| HostError::host(format!("Failed to install link logger: {e}")))
}
