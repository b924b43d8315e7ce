use crate::error::HostError;

use link_core::error::{ConfigError, LinkError};

use common::ErrorLocation;

use std::panic::Location;

/// **VALUE**: Verifies that link errors keep their message when surfaced by the app.
///
/// **WHY THIS MATTERS**: The binaries print only the HostError; the original
/// cause must survive the conversion.
#[test]
fn given_link_error_when_converted_then_core_variant_keeps_message() {
    // GIVEN: A link error
    let link_error = LinkError::service_unavailable("link service thread has exited");
    let original = link_error.to_string();

    // WHEN: Converting
    let error = HostError::from(link_error);

    // THEN: Core variant carrying the original text
    match error {
        HostError::Core { message, .. } => assert_eq!(message, original),
        other => panic!("Expected Core variant, got {other:?}"),
    }
}

/// **VALUE**: Verifies that config errors map to the Config variant.
#[test]
fn given_config_error_when_converted_then_config_variant() {
    // GIVEN: A config validation error
    let config_error = ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: "broker.ensure_attempts must be at least 1".to_string(),
    };

    // WHEN: Converting
    let error: HostError = config_error.into();

    // THEN: Config variant, message mentions the bad key
    assert!(matches!(error, HostError::Config { .. }));
    assert!(error.to_string().contains("ensure_attempts"));
}

/// **VALUE**: Verifies the display format of app errors.
#[test]
fn given_host_error_when_displayed_then_has_prefix_and_location() {
    // GIVEN/WHEN: A host error created here
    let text = HostError::host("link service failed to start").to_string();

    // THEN: Prefix, message and this file
    assert!(text.starts_with("Host Error: link service failed to start"));
    assert!(text.contains("error.rs"), "Location missing: {text}");
}
