use crate::error::registry::RegistryError;
use crate::registry::PortRegistry;
use crate::{APP_DIR_NAME, PORT_FILE_NAME};

use tempfile::TempDir;

fn registry_in(dir: &TempDir) -> PortRegistry {
    PortRegistry::new(dir.path().join("nested").join(PORT_FILE_NAME))
}

/// **VALUE**: Verifies that a missing port file reads as "not running".
///
/// **WHY THIS MATTERS**: A fresh machine has no record; workers must get a clean
/// "no port" answer rather than an error.
#[test]
fn given_missing_file_when_reading_then_returns_none() {
    // GIVEN: A registry pointing at a file that does not exist
    let dir = TempDir::new().expect("temp dir");
    let registry = registry_in(&dir);

    // WHEN: Reading
    let port = registry.read().expect("missing file is not an error");

    // THEN: No port
    assert_eq!(port, None);
}

/// **VALUE**: Verifies that writing a port creates the directory and the exact JSON shape.
#[test]
fn given_port_when_writing_then_file_holds_port_record() {
    // GIVEN: A registry in a directory that does not exist yet
    let dir = TempDir::new().expect("temp dir");
    let registry = registry_in(&dir);

    // WHEN: Writing a port
    registry.write(Some(51234)).expect("write succeeds");

    // THEN: The file holds {"port":51234} and reads back
    let contents = std::fs::read_to_string(registry.path()).expect("file exists");
    let json: serde_json::Value = serde_json::from_str(&contents).expect("valid json");
    assert_eq!(json, serde_json::json!({ "port": 51234 }));
    assert_eq!(registry.read().expect("readable"), Some(51234));
}

/// **VALUE**: Verifies that clearing leaves an empty object, not a deleted file.
///
/// **BUG THIS CATCHES**: Writing `{"port":null}` or a stale port after stop would
/// send workers to a dead endpoint.
#[test]
fn given_written_port_when_clearing_then_file_is_empty_object() {
    // GIVEN: A registry holding a port
    let dir = TempDir::new().expect("temp dir");
    let registry = registry_in(&dir);
    registry.write(Some(40000)).expect("write succeeds");

    // WHEN: Clearing
    registry.clear().expect("clear succeeds");

    // THEN: The file is `{}` and reads as None
    let contents = std::fs::read_to_string(registry.path()).expect("file exists");
    assert_eq!(contents.trim(), "{}");
    assert_eq!(registry.read().expect("readable"), None);
}

/// **VALUE**: Verifies that a corrupted record is reported as a parse error.
#[test]
fn given_corrupted_file_when_reading_then_returns_parse_error() {
    // GIVEN: A file with garbage in it
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join(PORT_FILE_NAME);
    std::fs::write(&path, "port = 12").expect("write garbage");
    let registry = PortRegistry::new(&path);

    // WHEN: Reading
    let result = registry.read();

    // THEN: Parse error naming the file
    match result {
        Err(RegistryError::Parse { path: err_path, .. }) => assert_eq!(err_path, path),
        other => panic!("Expected parse error, got {other:?}"),
    }
}

/// **VALUE**: Verifies that no temp file is left behind after a write.
#[test]
fn given_write_when_complete_then_no_temp_file_remains() {
    // GIVEN: A registry
    let dir = TempDir::new().expect("temp dir");
    let registry = PortRegistry::new(dir.path().join(PORT_FILE_NAME));

    // WHEN: Writing
    registry.write(Some(1)).expect("write succeeds");

    // THEN: Only the record itself exists
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .expect("dir readable")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![PORT_FILE_NAME.to_string()]);
}

/// **VALUE**: Verifies the default path layout.
#[test]
fn given_default_path_when_inspected_then_ends_with_app_dir_and_file() {
    // GIVEN/WHEN: The default registry path
    let path = PortRegistry::default_path();

    // THEN: It ends in blender-link/blender_link.json
    assert!(path.ends_with(format!("{APP_DIR_NAME}/{PORT_FILE_NAME}")));
}
