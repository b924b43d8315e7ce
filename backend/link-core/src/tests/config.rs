use crate::config::LinkConfig;
use crate::error::config::ConfigError;

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

/// **VALUE**: Verifies that a missing config file yields defaults.
#[test]
fn given_missing_file_when_loading_then_returns_defaults() {
    // GIVEN: An empty config directory
    let dir = TempDir::new().expect("temp dir");

    // WHEN: Loading
    let config = LinkConfig::load(dir.path()).expect("defaults");

    // THEN: Default values
    assert_eq!(config.service.port, 0);
    assert_eq!(config.service.handshake_timeout(), Duration::from_secs(5));
    assert_eq!(config.service.approval_timeout(), None);
    assert_eq!(config.broker.ensure_attempts, 5);
    assert_eq!(config.broker.ensure_interval(), Duration::from_secs(1));
    assert!(config.launcher.executable.is_none());
}

/// **VALUE**: Verifies that a partial file keeps defaults for omitted keys.
///
/// **WHY THIS MATTERS**: Users write only the keys they care about; a missing
/// section must not reset everything else or fail to parse.
#[test]
fn given_partial_file_when_loading_then_missing_keys_use_defaults() {
    // GIVEN: A config that only sets the worker executable and an approval timeout
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(
        dir.path().join("link.toml"),
        r#"
[service]
approval_timeout_secs = 30

[launcher]
executable = "/opt/blender/blender"
args = ["--background"]
"#,
    )
    .expect("write config");

    // WHEN: Loading
    let config = LinkConfig::load(dir.path()).expect("valid config");

    // THEN: Set keys are read and the rest default
    assert_eq!(
        config.service.approval_timeout(),
        Some(Duration::from_secs(30))
    );
    assert_eq!(
        config.launcher.executable,
        Some(PathBuf::from("/opt/blender/blender"))
    );
    assert_eq!(config.launcher.args, vec!["--background".to_string()]);
    assert_eq!(config.client.call_timeout_ms, 2_000);
}

/// **VALUE**: Verifies that invalid TOML is a parse error.
#[test]
fn given_invalid_toml_when_loading_then_returns_parse_error() {
    // GIVEN: A broken file
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("link.toml"), "[service\nport = ").expect("write");

    // WHEN: Loading
    let result = LinkConfig::load(dir.path());

    // THEN: ParseError
    assert!(matches!(result, Err(ConfigError::ParseError { .. })));
}

/// **VALUE**: Verifies that out-of-range values are rejected on load.
#[test]
fn given_zero_attempts_when_loading_then_returns_validation_error() {
    // GIVEN: A config with zero ensure attempts
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(
        dir.path().join("link.toml"),
        "[broker]\nensure_attempts = 0\n",
    )
    .expect("write");

    // WHEN: Loading
    let result = LinkConfig::load(dir.path());

    // THEN: ValidationError
    assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
}

/// **VALUE**: Verifies that a saved config loads back unchanged.
#[test]
fn given_modified_config_when_saved_then_load_returns_same_values() {
    // GIVEN: A config with non-default values
    let dir = TempDir::new().expect("temp dir");
    let mut config = LinkConfig::default();
    config.service.port = 47001;
    config.service.port_file = Some(dir.path().join("port.json"));
    config.launcher.executable = Some(PathBuf::from("worker"));

    // WHEN: Saving and loading
    config.save(dir.path()).expect("save succeeds");
    let loaded = LinkConfig::load(dir.path()).expect("load succeeds");

    // THEN: Values match and the temp file is gone
    assert_eq!(loaded.service.port, 47001);
    assert_eq!(loaded.service.port_file, config.service.port_file);
    assert_eq!(loaded.launcher.executable, Some(PathBuf::from("worker")));
    assert!(!dir.path().join("link.toml.tmp").exists());
}

/// **VALUE**: Verifies that an empty executable path is refused.
#[test]
fn given_empty_executable_when_validating_then_returns_validation_error() {
    // GIVEN: An empty executable path
    let mut config = LinkConfig::default();
    config.launcher.executable = Some(PathBuf::new());

    // WHEN: Validating
    let result = config.validate();

    // THEN: ValidationError
    assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
}

/// **VALUE**: Verifies that a configured port file is used by the service registry.
#[test]
fn given_port_file_when_building_registry_then_registry_uses_it() {
    // GIVEN: A service config with an explicit port file
    let mut config = LinkConfig::default();
    config.service.port_file = Some(PathBuf::from("/tmp/custom/port.json"));

    // WHEN: Building the registry
    let registry = config.service.registry();

    // THEN: It points at the configured file
    assert_eq!(registry.path(), PathBuf::from("/tmp/custom/port.json"));
}
