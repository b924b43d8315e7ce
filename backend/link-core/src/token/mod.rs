//! Token codec: encoding, decoding and minting of worker tokens.
//!
//! Wire format is `<process-id>:<secret>`, exactly [`TOKEN_LENGTH`] ASCII bytes.

use crate::error::link::LinkError;

use models::{
    MAX_PROCESS_ID, PROCESS_ID_WIDTH, SECRET_LENGTH, TOKEN_LENGTH, TOKEN_SEPARATOR, Token,
    TokenBuilder,
};

use std::collections::HashSet;

use uuid::Uuid;

/// Encode a process id and secret into a wire token.
///
/// # Errors
///
/// Returns [`LinkError::MalformedToken`] if the process id is not exactly
/// five digits or the secret does not have the configured length.
#[track_caller]
pub fn encode(process_id: &str, secret: &str) -> Result<String, LinkError> {
    if process_id.len() != PROCESS_ID_WIDTH || !process_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(LinkError::malformed_token(format!(
            "process id must be {PROCESS_ID_WIDTH} digits, got {} characters",
            process_id.chars().count()
        )));
    }

    if !secret.is_ascii() || secret.len() != SECRET_LENGTH {
        return Err(LinkError::malformed_token(format!(
            "secret must be {SECRET_LENGTH} ASCII characters, got {}",
            secret.chars().count()
        )));
    }

    Ok(format!("{process_id}{TOKEN_SEPARATOR}{secret}"))
}

/// Encode an already validated token.
pub fn encode_token(token: &Token) -> String {
    format!(
        "{}{TOKEN_SEPARATOR}{}",
        token.process_id(),
        token.secret().as_str()
    )
}

/// Split a token on its first separator.
///
/// A token without a separator decodes to two empty strings, which callers
/// treat as malformed.
pub fn decode(token: &str) -> (String, String) {
    match token.split_once(TOKEN_SEPARATOR) {
        Some((process_id, secret)) => (process_id.to_string(), secret.to_string()),
        None => (String::new(), String::new()),
    }
}

/// Decode and validate a wire token.
#[track_caller]
pub fn parse(token: &str) -> Result<Token, LinkError> {
    if token.len() != TOKEN_LENGTH {
        return Err(LinkError::malformed_token(format!(
            "token must be {TOKEN_LENGTH} bytes, got {}",
            token.len()
        )));
    }

    let (process_id, secret) = decode(token);
    if process_id.is_empty() {
        return Err(LinkError::malformed_token("token has no separator"));
    }

    Ok(TokenBuilder::default()
        .with_process_id(process_id)
        .with_secret(secret)
        .build()?)
}

/// Smallest process id in `[0, MAX_PROCESS_ID]` not already in use.
///
/// Ids in `existing` that are not numeric are ignored.
#[track_caller]
pub fn generate_process_id<I, S>(existing: I) -> Result<String, LinkError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let taken: HashSet<u32> = existing
        .into_iter()
        .filter_map(|id| id.as_ref().parse::<u32>().ok())
        .collect();

    (0..=MAX_PROCESS_ID)
        .find(|candidate| !taken.contains(candidate))
        .map(format_process_id)
        .ok_or_else(LinkError::no_free_process_id)
}

/// Fresh random secret of [`SECRET_LENGTH`] lowercase hex characters.
///
/// Backed by a v4 UUID drawn from the operating system CSPRNG. The version
/// and variant fields are fixed, leaving 122 random bits.
pub fn generate_secret() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Mint a brand new token for `process_id`.
#[track_caller]
pub fn mint(process_id: &str) -> Result<Token, LinkError> {
    Ok(TokenBuilder::default()
        .with_process_id(process_id)
        .with_secret(generate_secret())
        .build()?)
}

/// Placeholder token asking the service for interactive approval.
#[track_caller]
pub fn placeholder_token(process_id: &str) -> Result<Token, LinkError> {
    Ok(Token::placeholder(process_id)?)
}

/// Placeholder token for the current process, used when a worker has no
/// prior pairing.
#[track_caller]
pub fn own_placeholder_token() -> Result<Token, LinkError> {
    let process_id = format_process_id(std::process::id() % (MAX_PROCESS_ID + 1));
    placeholder_token(&process_id)
}

pub fn format_process_id(id: u32) -> String {
    format!("{id:0width$}", width = PROCESS_ID_WIDTH)
}
