//! Registry of paired workers.
//!
//! Owned by the service actor; nothing outside the service thread touches it
//! except through service commands.

use common::RedactedSecret;
use models::Token;

use std::collections::HashMap;

/// Mapping `process_id -> secret` for every trusted worker.
#[derive(Debug, Default)]
pub(crate) struct AuthTable {
    entries: HashMap<String, RedactedSecret>,
}

impl AuthTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Trust `token`. Placeholder tokens are never stored.
    ///
    /// Returns false if the token was a placeholder.
    pub(crate) fn insert(&mut self, token: &Token) -> bool {
        if token.is_placeholder() {
            return false;
        }
        self.entries
            .insert(token.process_id().to_string(), token.secret().clone());
        true
    }

    pub(crate) fn remove(&mut self, process_id: &str) -> bool {
        self.entries.remove(process_id).is_some()
    }

    /// True iff the table holds exactly this secret for the token's process id.
    pub(crate) fn validate(&self, token: &Token) -> bool {
        if token.is_placeholder() {
            return false;
        }
        self.entries
            .get(token.process_id())
            .is_some_and(|secret| secret == token.secret())
    }

    pub(crate) fn contains(&self, process_id: &str) -> bool {
        self.entries.contains_key(process_id)
    }

    pub(crate) fn process_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
