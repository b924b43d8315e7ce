use crate::RedactedSecret;

/// **VALUE**: Verifies that secrets never leak through Debug or Display.
///
/// **WHY THIS MATTERS**: Tokens are logged at every handshake step. A derived Debug
/// would print pairing secrets into the host's log file.
#[test]
fn given_secret_when_formatted_then_value_is_redacted() {
    // GIVEN: A secret
    let secret = RedactedSecret::new("0123456789abcdef0123456789abcdef");

    // WHEN: Formatting with Debug and Display
    let debug = format!("{secret:?}");
    let display = format!("{secret}");

    // THEN: Neither contains the value
    assert!(!debug.contains("0123456789abcdef"));
    assert!(!display.contains("0123456789abcdef"));
    assert!(debug.contains("REDACTED"));
}

/// **VALUE**: Verifies that serializing a secret fails instead of emitting it.
#[test]
fn given_secret_when_serialized_then_returns_error() {
    // GIVEN: A secret
    let secret = RedactedSecret::new("abc");

    // WHEN: Serializing to JSON
    let result = serde_json::to_string(&secret);

    // THEN: Serialization is refused
    assert!(result.is_err(), "RedactedSecret must not serialize");
}

/// **VALUE**: Verifies equality semantics of the constant-time comparison.
///
/// **BUG THIS CATCHES**: Would catch a comparison that only checks a common prefix
/// or ignores length differences.
#[test]
fn given_secrets_when_compared_then_equal_only_on_identical_values() {
    // GIVEN: Secrets differing in content and length
    let original = RedactedSecret::new("abcdef");
    let same = RedactedSecret::new("abcdef");
    let different = RedactedSecret::new("abcdeg");
    let prefix = RedactedSecret::new("abc");

    // WHEN/THEN: Only identical values compare equal
    assert_eq!(original, same);
    assert_ne!(original, different);
    assert_ne!(original, prefix);
}

#[test]
fn given_fill_character_when_checking_filled_then_matches_only_uniform_secrets() {
    assert!(RedactedSecret::new("****").is_filled_with('*'));
    assert!(!RedactedSecret::new("**a*").is_filled_with('*'));
    assert!(!RedactedSecret::new("").is_filled_with('*'));
}
