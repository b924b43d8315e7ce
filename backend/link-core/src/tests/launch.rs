// Integration tests that actually start a worker are in integration_tests/link/broker.rs

use crate::config::LauncherConfig;
use crate::error::link::LinkError;
use crate::link::launch::{build_worker_command, spawn_worker};
use crate::token::{encode_token, mint};
use crate::{ENV_LINK_PORT, ENV_LINK_TOKEN};

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

fn env_value<'a>(
    envs: &'a [(&'a OsStr, Option<&'a OsStr>)],
    key: &str,
) -> Option<Option<&'a OsStr>> {
    envs.iter()
        .find(|(name, _)| *name == OsStr::new(key))
        .map(|(_, value)| *value)
}

/// **VALUE**: Verifies the worker command carries the port and token.
///
/// **WHY THIS MATTERS**: The environment is the only channel through which a
/// launched worker learns where and how to connect.
#[test]
fn given_paired_launch_when_building_command_then_env_has_port_and_token() {
    // GIVEN: A minted token and a port
    let token = mint("00005").expect("valid id");
    let args = vec!["--background".to_string()];

    // WHEN: Building the command
    let cmd = build_worker_command(Path::new("/opt/worker"), &args, 43210, Some(&token));

    // THEN: Program, args and env are set
    let std_cmd = cmd.as_std();
    assert_eq!(std_cmd.get_program(), OsStr::new("/opt/worker"));
    let collected_args: Vec<&OsStr> = std_cmd.get_args().collect();
    assert_eq!(collected_args, vec![OsStr::new("--background")]);

    let envs: Vec<(&OsStr, Option<&OsStr>)> = std_cmd.get_envs().collect();
    let expected_token = encode_token(&token);
    assert_eq!(
        env_value(&envs, ENV_LINK_PORT),
        Some(Some(OsStr::new("43210")))
    );
    assert_eq!(
        env_value(&envs, ENV_LINK_TOKEN),
        Some(Some(OsStr::new(expected_token.as_str())))
    );
}

/// **VALUE**: Verifies an unpaired launch removes any inherited token.
///
/// **BUG THIS CATCHES**: A host started from a worker's shell would otherwise
/// hand its own stale token to every child.
#[test]
fn given_unpaired_launch_when_building_command_then_token_env_is_removed() {
    // GIVEN/WHEN: Building without a token
    let cmd = build_worker_command(Path::new("worker"), &[], 1, None);

    // THEN: The token variable is explicitly removed
    let envs: Vec<(&OsStr, Option<&OsStr>)> = cmd.as_std().get_envs().collect();
    assert_eq!(env_value(&envs, ENV_LINK_TOKEN), Some(None));
}

/// **VALUE**: Verifies that launching without a configured executable fails cleanly.
#[tokio::test]
async fn given_no_executable_when_spawning_then_returns_worker_executable_missing() {
    // GIVEN: An empty launcher config
    let launcher = LauncherConfig::default();

    // WHEN: Spawning
    let result = spawn_worker(&launcher, 1, None);

    // THEN: WorkerExecutableMissing
    assert!(matches!(
        result,
        Err(LinkError::WorkerExecutableMissing { .. })
    ));
}

/// **VALUE**: Verifies that a nonexistent executable is reported as missing after
/// the fallback location was also tried.
#[tokio::test]
async fn given_nonexistent_executable_when_spawning_then_returns_worker_executable_missing() {
    // GIVEN: A path that does not exist anywhere
    let launcher = LauncherConfig {
        executable: Some(PathBuf::from(
            "/nonexistent/blender-link/worker-that-does-not-exist",
        )),
        args: Vec::new(),
    };

    // WHEN: Spawning
    let result = spawn_worker(&launcher, 1, None);

    // THEN: WorkerExecutableMissing
    assert!(matches!(
        result,
        Err(LinkError::WorkerExecutableMissing { .. })
    ));
}
