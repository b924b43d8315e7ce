use crate::{ModelError, SECRET_LENGTH, Token, TokenBuilder};

const VALID_SECRET: &str = "0123456789abcdef0123456789abcdef";

fn validation_message(result: Result<Token, ModelError>) -> String {
    match result {
        Err(ModelError::Validation { message, .. }) => message,
        Ok(token) => panic!("Expected validation error, got {token:?}"),
    }
}

/// **VALUE**: Verifies that a well-formed process id and secret build a token.
#[test]
fn given_valid_fields_when_building_token_then_succeeds() {
    // GIVEN: A five digit process id and a hex secret
    let builder = TokenBuilder::default()
        .with_process_id("00042")
        .with_secret(VALID_SECRET);

    // WHEN: Building
    let token = builder.build().expect("valid token");

    // THEN: Fields are preserved and the token is not a placeholder
    assert_eq!(token.process_id(), "00042");
    assert_eq!(token.secret().as_str(), VALID_SECRET);
    assert!(!token.is_placeholder());
}

/// **VALUE**: Verifies that process ids must be exactly five digits.
///
/// **WHY THIS MATTERS**: The handshake reads a fixed number of bytes. A four or six
/// digit id would shift the separator and corrupt the secret on the server side.
#[test]
fn given_wrong_width_process_id_when_building_then_returns_validation_error() {
    // GIVEN: Process ids of the wrong shape
    for process_id in ["42", "000042", "0004a", ""] {
        // WHEN: Building
        let result = TokenBuilder::default()
            .with_process_id(process_id)
            .with_secret(VALID_SECRET)
            .build();

        // THEN: Validation rejects it
        assert_eq!(
            validation_message(result),
            "Process ID must be exactly 5 digits",
            "Should reject {process_id:?}"
        );
    }
}

/// **VALUE**: Verifies that secrets of the wrong length are rejected.
#[test]
fn given_short_secret_when_building_then_returns_validation_error() {
    // GIVEN: A secret one character short
    let secret = &VALID_SECRET[..SECRET_LENGTH - 1];

    // WHEN: Building
    let result = TokenBuilder::default()
        .with_process_id("00001")
        .with_secret(secret)
        .build();

    // THEN: Validation names the expected length
    assert!(validation_message(result).contains("32 characters"));
}

/// **VALUE**: Verifies that non-hex secrets other than the placeholder are rejected.
///
/// **BUG THIS CATCHES**: Would catch a secret containing the separator, which
/// would make the encoded token ambiguous.
#[test]
fn given_non_hex_secret_when_building_then_returns_validation_error() {
    // GIVEN: A secret of the right length containing ':'
    let secret = format!("{}:", &VALID_SECRET[..SECRET_LENGTH - 1]);

    // WHEN: Building
    let result = TokenBuilder::default()
        .with_process_id("00001")
        .with_secret(secret)
        .build();

    // THEN: Rejected
    assert_eq!(
        validation_message(result),
        "Secret must be hex or the placeholder"
    );
}

#[test]
fn given_missing_process_id_when_building_then_returns_validation_error() {
    let result = TokenBuilder::default().with_secret(VALID_SECRET).build();

    assert_eq!(validation_message(result), "Process ID is required");
}

/// **VALUE**: Verifies that the placeholder token is recognised as such.
///
/// **WHY THIS MATTERS**: The placeholder is what routes a worker into the approval
/// path. If `is_placeholder()` misfires, unpaired workers are silently rejected.
#[test]
fn given_placeholder_when_built_then_is_placeholder() {
    // GIVEN/WHEN: A placeholder token
    let token = Token::placeholder("00042").expect("valid placeholder");

    // THEN: It is a placeholder with the full-width secret
    assert!(token.is_placeholder());
    assert_eq!(token.secret().len(), SECRET_LENGTH);
}
