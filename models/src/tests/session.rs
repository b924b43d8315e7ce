use crate::{LinkSession, LinkState};

#[test]
fn given_default_session_when_inspected_then_is_stopped_without_port() {
    let session = LinkSession::default();

    assert_eq!(session.state, LinkState::Stopped);
    assert_eq!(session.port, None);
    assert!(!session.is_listening());
}

#[test]
fn given_listening_session_when_inspected_then_reports_port() {
    let session = LinkSession::listening(40000);

    assert!(session.is_listening());
    assert_eq!(session.port, Some(40000));
}
