use crate::error::link::LinkError;
use crate::link::handshake::{read_token, write_token};

use models::TOKEN_LENGTH;

use std::time::Duration;

use tokio::io::{AsyncWriteExt, duplex};

const LIMIT: Duration = Duration::from_millis(200);
const WIRE_TOKEN: &str = "00001:0123456789abcdef0123456789abcdef";

/// **VALUE**: Verifies a written token is read back byte for byte.
#[tokio::test]
async fn given_written_token_when_reading_then_returns_exact_token() {
    // GIVEN: A pipe with a token written on one end
    let (mut client, mut server) = duplex(64);
    write_token(&mut client, WIRE_TOKEN).await.expect("write");

    // WHEN: Reading on the other end
    let token = read_token(&mut server, LIMIT).await.expect("read");

    // THEN: Same token
    assert_eq!(token, WIRE_TOKEN);
    assert_eq!(token.len(), TOKEN_LENGTH);
}

/// **VALUE**: Verifies that only the token bytes are consumed.
///
/// **BUG THIS CATCHES**: Reading past the token would swallow the first call
/// frame that follows it on the same connection.
#[tokio::test]
async fn given_token_followed_by_frames_when_reading_then_leaves_rest_unread() {
    // GIVEN: A token immediately followed by more data
    let (mut client, mut server) = duplex(128);
    client
        .write_all(format!("{WIRE_TOKEN}{{\"kind\":\"request\"}}\n").as_bytes())
        .await
        .expect("write");

    // WHEN: Reading the token
    let token = read_token(&mut server, LIMIT).await.expect("read");

    // THEN: Exactly the token was consumed
    assert_eq!(token, WIRE_TOKEN);
}

/// **VALUE**: Verifies that a silent peer times out.
#[tokio::test]
async fn given_silent_peer_when_reading_then_returns_timeout() {
    // GIVEN: A pipe nobody writes to
    let (_client, mut server) = duplex(64);

    // WHEN: Reading
    let result = read_token(&mut server, LIMIT).await;

    // THEN: Timeout
    assert!(matches!(result, Err(LinkError::Timeout { .. })));
}

/// **VALUE**: Verifies that a peer hanging up mid-token reads as a rejection.
///
/// **WHY THIS MATTERS**: The service rejects a handshake by closing the
/// connection; the worker must see that as an authentication failure to
/// trigger its placeholder retry.
#[tokio::test]
async fn given_peer_closes_early_when_reading_then_returns_authentication_failure() {
    // GIVEN: A partial token and a closed writer
    let (mut client, mut server) = duplex(64);
    client.write_all(b"00001:abc").await.expect("write");
    drop(client);

    // WHEN: Reading
    let result = read_token(&mut server, LIMIT).await;

    // THEN: AuthenticationFailed
    assert!(matches!(result, Err(LinkError::AuthenticationFailed { .. })));
}

/// **VALUE**: Verifies that tokens of the wrong length are never sent.
#[tokio::test]
async fn given_short_token_when_writing_then_returns_malformed_token() {
    // GIVEN: A pipe
    let (mut client, _server) = duplex(64);

    // WHEN: Writing a short token
    let result = write_token(&mut client, "00001:abc").await;

    // THEN: MalformedToken
    assert!(matches!(result, Err(LinkError::MalformedToken { .. })));
}
