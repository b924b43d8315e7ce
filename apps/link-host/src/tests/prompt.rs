use crate::prompt::is_approval;

/// **VALUE**: Verifies that only an explicit yes approves.
///
/// **WHY THIS MATTERS**: Pairing hands a process full access to the host; an
/// accidental Enter must not grant it.
#[test]
fn given_answers_when_interpreted_then_only_yes_approves() {
    // GIVEN: Approving answers
    for answer in ["y", "Y", "yes", " YES \n"] {
        // THEN: Approved
        assert!(is_approval(answer), "Should approve {answer:?}");
    }

    // GIVEN: Everything else
    for answer in ["", "\n", "n", "no", "yep", "sure"] {
        // THEN: Denied
        assert!(!is_approval(answer), "Should deny {answer:?}");
    }
}
