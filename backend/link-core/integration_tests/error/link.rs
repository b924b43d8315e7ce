use link_core::error::{CoreError, LinkError};
use link_core::token;

use models::{ModelError, TokenBuilder};

/// **VALUE**: Verifies that error messages carry the kind, detail and call site.
///
/// **WHY THIS MATTERS**: Logs are the only record of why a worker was refused;
/// the location points straight at the failing check.
#[test]
fn given_authentication_error_when_displayed_then_includes_process_and_location() {
    // GIVEN: An authentication failure created here
    let error = LinkError::authentication_failed("00007", "secret mismatch");

    // WHEN: Formatting it
    let text = error.to_string();

    // THEN: Kind, process id, message and this file appear
    assert!(text.starts_with("Authentication Error:"), "Got: {text}");
    assert!(text.contains("'00007'"));
    assert!(text.contains("secret mismatch"));
    assert!(text.contains("link.rs"), "Location missing: {text}");
}

/// **VALUE**: Verifies which errors count as authentication failures.
///
/// **BUG THIS CATCHES**: If timeouts counted, an unreachable host would make
/// the worker fall back to a placeholder and pester the user for approval.
#[test]
fn given_errors_when_classified_then_only_auth_and_malformed_are_auth_failures() {
    // GIVEN: One error of each interesting kind
    let auth = LinkError::authentication_failed("00001", "denied");
    let malformed = LinkError::malformed_token("bad");
    let timeout = LinkError::timeout("slow");
    let closed = LinkError::channel_closed();

    // WHEN/THEN: Classification and categories
    assert!(auth.is_authentication_failure());
    assert!(malformed.is_authentication_failure());
    assert!(!timeout.is_authentication_failure());
    assert!(!closed.is_authentication_failure());

    assert_eq!(auth.error_category(), "authentication");
    assert_eq!(malformed.error_category(), "malformed_token");
    assert_eq!(timeout.error_category(), "timeout");
    assert_eq!(closed.error_category(), "channel_closed");
}

/// **VALUE**: Verifies that model validation failures surface as malformed tokens.
#[test]
fn given_invalid_token_fields_when_converted_then_becomes_malformed_token() {
    // GIVEN: A builder error
    let model_error: ModelError = TokenBuilder::default()
        .with_process_id("1")
        .with_secret("abc")
        .build()
        .expect_err("invalid fields");

    // WHEN: Converting into a link error
    let error = LinkError::from(model_error);

    // THEN: MalformedToken with the validation message
    match error {
        LinkError::MalformedToken { message, .. } => {
            assert!(message.contains("Process ID"), "Got: {message}")
        }
        other => panic!("Expected MalformedToken, got {other:?}"),
    }
}

/// **VALUE**: Verifies that the aggregate error is transparent.
#[test]
fn given_link_error_when_wrapped_in_core_error_then_display_is_unchanged() {
    // GIVEN: A codec error
    let error = token::encode("7", "short").expect_err("bad parts");
    let text = error.to_string();

    // WHEN: Wrapping
    let core: CoreError = error.into();

    // THEN: Same message
    assert_eq!(core.to_string(), text);
    assert!(matches!(core, CoreError::Link(LinkError::MalformedToken { .. })));
}
