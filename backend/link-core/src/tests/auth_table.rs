use crate::link::auth_table::AuthTable;
use crate::token::{mint, placeholder_token};

/// **VALUE**: Verifies that a trusted token validates and a different secret does not.
///
/// **WHY THIS MATTERS**: This is the whole authentication decision for
/// returning workers.
#[test]
fn given_paired_token_when_validating_then_only_exact_secret_passes() {
    // GIVEN: A table trusting one token
    let mut table = AuthTable::new();
    let trusted = mint("00001").expect("valid id");
    assert!(table.insert(&trusted));

    // WHEN: Validating the trusted token and a forged one with the same id
    let forged = mint("00001").expect("valid id");

    // THEN: Only the trusted one passes
    assert!(table.validate(&trusted));
    assert!(!table.validate(&forged));
}

/// **VALUE**: Verifies that placeholders are never stored and never validate.
///
/// **BUG THIS CATCHES**: Storing a placeholder would let every unpaired worker
/// with that id skip approval.
#[test]
fn given_placeholder_when_inserting_then_table_is_unchanged() {
    // GIVEN: An empty table and a placeholder token
    let mut table = AuthTable::new();
    let placeholder = placeholder_token("00002").expect("valid id");

    // WHEN: Inserting it
    let inserted = table.insert(&placeholder);

    // THEN: Nothing is stored and it does not validate
    assert!(!inserted);
    assert_eq!(table.len(), 0);
    assert!(!table.validate(&placeholder));
}

/// **VALUE**: Verifies that inserting the same id again replaces the secret.
#[test]
fn given_existing_entry_when_reinserting_then_new_secret_wins() {
    // GIVEN: A table trusting an old secret
    let mut table = AuthTable::new();
    let old = mint("00004").expect("valid id");
    table.insert(&old);

    // WHEN: Trusting a new secret for the same id
    let new = mint("00004").expect("valid id");
    table.insert(&new);

    // THEN: Only the new secret validates
    assert!(table.validate(&new));
    assert!(!table.validate(&old));
    assert_eq!(table.len(), 1);
}

/// **VALUE**: Verifies remove and clear drop entries.
#[test]
fn given_entries_when_removed_or_cleared_then_they_no_longer_validate() {
    // GIVEN: Two trusted tokens
    let mut table = AuthTable::new();
    let first = mint("00001").expect("valid id");
    let second = mint("00002").expect("valid id");
    table.insert(&first);
    table.insert(&second);

    // WHEN: Removing the first
    assert!(table.remove("00001"));
    assert!(!table.remove("00001"));

    // THEN: Only the second remains
    assert!(!table.contains("00001"));
    assert!(table.validate(&second));

    // WHEN: Clearing
    table.clear();

    // THEN: Nothing remains
    assert_eq!(table.process_ids().count(), 0);
}
