use crate::ErrorLocation;
use std::panic::Location;

/// **VALUE**: Verifies that `ErrorLocation::from()` correctly captures file, line, and column.
///
/// **WHY THIS MATTERS**: Every link error carries an ErrorLocation. If capture breaks,
/// handshake and launch failures lose the call site that produced them.
#[test]
fn given_location_caller_when_error_location_created_then_captures_file_line_column() {
    // GIVEN: Current caller location
    // WHEN: Creating ErrorLocation from caller
    let location = ErrorLocation::from(Location::caller());

    // THEN: Should capture file, line, and column
    assert!(
        location.file.contains("error_location.rs"),
        "Should capture file path"
    );
    assert_eq!(location.line, 12, "Should capture correct line number");
    assert!(location.column > 0, "Should capture column number");
}

/// **VALUE**: Verifies that ErrorLocation Display formatting produces "[file:line:column]".
#[test]
fn given_error_location_when_formatted_then_produces_bracketed_format() {
    // GIVEN: An ErrorLocation
    let location = ErrorLocation::from(Location::caller());

    // WHEN: Formatting as string
    let formatted = format!("{location}");

    // THEN: Should produce "[file:line:column]" format
    assert!(formatted.starts_with('['), "Should start with '['");
    assert!(formatted.ends_with(']'), "Should end with ']'");
    assert!(formatted.contains(&format!(":{}:", location.line)));
    assert_eq!(formatted.matches(':').count(), 2, "Should have exactly 2 colons");
}

/// **VALUE**: Verifies that `#[track_caller]` propagation gives each call site its own line.
///
/// **BUG THIS CATCHES**: Would catch if error constructors lose `#[track_caller]`
/// and every error starts pointing at the constructor instead of the failure site.
#[test]
fn given_multiple_call_sites_when_capturing_location_then_each_has_unique_line() {
    // GIVEN: A helper function that captures location
    #[track_caller]
    fn capture_location() -> ErrorLocation {
        ErrorLocation::from(Location::caller())
    }

    // WHEN: Capturing location from different call sites
    let first = capture_location();
    let second = capture_location();

    // THEN: Same file, sequential lines
    assert_eq!(first.file, second.file);
    assert_eq!(first.line + 1, second.line, "Lines should be sequential");
}
