use crate::error::link::LinkError;
use crate::token::{
    decode, encode, encode_token, format_process_id, generate_process_id, generate_secret, mint,
    own_placeholder_token, parse, placeholder_token,
};

use models::{MAX_PROCESS_ID, PLACEHOLDER_CHAR, SECRET_LENGTH, TOKEN_LENGTH};

use std::collections::HashSet;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

/// **VALUE**: Verifies the codec round trip: decoding an encoded token yields
/// the original process id and secret.
///
/// **WHY THIS MATTERS**: The service and the worker encode and decode on
/// opposite ends of the wire; any asymmetry locks every worker out.
#[test]
fn given_valid_parts_when_encoded_then_decode_returns_them() {
    // GIVEN: A valid process id and secret
    let process_id = "00007";

    // WHEN: Encoding then decoding
    let wire = encode(process_id, SECRET).expect("valid parts");
    let (decoded_id, decoded_secret) = decode(&wire);

    // THEN: The parts survive and the wire form has the fixed length
    assert_eq!(wire.len(), TOKEN_LENGTH);
    assert_eq!(decoded_id, process_id);
    assert_eq!(decoded_secret, SECRET);
}

/// **VALUE**: Verifies that encode refuses parts that would break the fixed width.
///
/// **BUG THIS CATCHES**: A secret of the wrong length would make the server read
/// past the token into the first call frame.
#[test]
fn given_bad_parts_when_encoded_then_returns_malformed_token() {
    // GIVEN: Bad process ids and secrets
    let long_secret = format!("{SECRET}0");
    let cases = [
        ("7", SECRET),
        ("123456", SECRET),
        ("abcde", SECRET),
        ("00007", "short"),
        ("00007", long_secret.as_str()),
    ];

    for (process_id, secret) in cases {
        // WHEN: Encoding
        let result = encode(process_id, secret);

        // THEN: MalformedToken, no panic
        assert!(
            matches!(result, Err(LinkError::MalformedToken { .. })),
            "Should reject ({process_id:?}, {secret:?})"
        );
    }
}

/// **VALUE**: Verifies that a token without a separator decodes to empty parts.
#[test]
fn given_token_without_separator_when_decoded_then_returns_empty_parts() {
    // GIVEN: A string with no ':'
    let raw = "no separator here";

    // WHEN: Decoding
    let (process_id, secret) = decode(raw);

    // THEN: Both parts are empty
    assert!(process_id.is_empty());
    assert!(secret.is_empty());
}

/// **VALUE**: Verifies that decode splits on the first separator only.
#[test]
fn given_secret_containing_separator_when_decoded_then_splits_on_first() {
    // GIVEN: A token whose secret contains ':'
    let raw = "00001:ab:cd";

    // WHEN: Decoding
    let (process_id, secret) = decode(raw);

    // THEN: Everything after the first ':' is the secret
    assert_eq!(process_id, "00001");
    assert_eq!(secret, "ab:cd");
}

/// **VALUE**: Verifies that parse rejects tokens of the wrong length before
/// looking inside them.
#[test]
fn given_wrong_length_when_parsed_then_returns_malformed_token() {
    // GIVEN: A token one byte too long
    let raw = format!("00001:{SECRET}0");

    // WHEN: Parsing
    let result = parse(&raw);

    // THEN: Rejected as malformed
    assert!(matches!(result, Err(LinkError::MalformedToken { .. })));
}

/// **VALUE**: Verifies that parse recognizes the placeholder secret.
#[test]
fn given_placeholder_wire_token_when_parsed_then_token_is_placeholder() {
    // GIVEN: The wire form of a placeholder token
    let raw = format!("00003:{}", PLACEHOLDER_CHAR.to_string().repeat(SECRET_LENGTH));

    // WHEN: Parsing
    let token = parse(&raw).expect("placeholder is well formed");

    // THEN: It is flagged as a placeholder
    assert!(token.is_placeholder());
    assert_eq!(token.process_id(), "00003");
}

/// **VALUE**: Verifies that the smallest unused process id is chosen.
///
/// **WHY THIS MATTERS**: Ids are reused once freed; skipping gaps would exhaust
/// the id space over a long session.
#[test]
fn given_ids_with_gap_when_generating_then_returns_smallest_free() {
    // GIVEN: Ids 0, 1 and 3 in use
    let existing = ["00000", "00001", "00003"];

    // WHEN: Generating
    let id = generate_process_id(existing).expect("space left");

    // THEN: The gap is filled
    assert_eq!(id, "00002");
}

/// **VALUE**: Verifies that an empty registry starts at zero.
#[test]
fn given_no_ids_when_generating_then_returns_zero() {
    // GIVEN/WHEN: No ids in use
    let id = generate_process_id(Vec::<String>::new()).expect("space left");

    // THEN: Id zero, zero padded
    assert_eq!(id, "00000");
}

/// **VALUE**: Verifies that a full id space is reported instead of wrapping.
#[test]
fn given_every_id_taken_when_generating_then_returns_no_free_process_id() {
    // GIVEN: Every id from 0 to MAX_PROCESS_ID in use
    let existing: Vec<String> = (0..=MAX_PROCESS_ID).map(format_process_id).collect();

    // WHEN: Generating
    let result = generate_process_id(&existing);

    // THEN: NoFreeProcessId
    assert!(matches!(result, Err(LinkError::NoFreeProcessId { .. })));
}

/// **VALUE**: Verifies that generated secrets have the right shape and do not repeat.
///
/// **BUG THIS CATCHES**: A constant or low-entropy secret would let any local
/// process impersonate a paired worker.
#[test]
fn given_many_generations_when_generating_secrets_then_all_are_unique_hex() {
    // GIVEN/WHEN: A batch of secrets
    let secrets: Vec<String> = (0..1000).map(|_| generate_secret()).collect();

    // THEN: Every secret is lowercase hex of the fixed length
    for secret in &secrets {
        assert_eq!(secret.len(), SECRET_LENGTH);
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    // THEN: No duplicates
    let unique: HashSet<&String> = secrets.iter().collect();
    assert_eq!(unique.len(), secrets.len());
}

/// **VALUE**: Verifies that a minted token keeps its id and is a real pairing.
#[test]
fn given_process_id_when_minting_then_token_is_not_placeholder() {
    // GIVEN/WHEN: Minting for id 00012
    let token = mint("00012").expect("valid id");

    // THEN: Same id, fresh secret, encodes to the fixed length
    assert_eq!(token.process_id(), "00012");
    assert!(!token.is_placeholder());
    assert_eq!(encode_token(&token).len(), TOKEN_LENGTH);
}

/// **VALUE**: Verifies placeholder helpers produce placeholder tokens.
#[test]
fn given_placeholder_helpers_when_called_then_tokens_are_placeholders() {
    // GIVEN/WHEN: Building placeholders explicitly and for this process
    let explicit = placeholder_token("00009").expect("valid id");
    let own = own_placeholder_token().expect("pid fits");

    // THEN: Both carry the placeholder secret
    assert!(explicit.is_placeholder());
    assert!(own.is_placeholder());
    assert_eq!(
        own.process_id(),
        format_process_id(std::process::id() % (MAX_PROCESS_ID + 1))
    );
}
