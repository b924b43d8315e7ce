use crate::Token;

/// Events raised by the link service for the host application.
///
/// The host's only obligation is to answer every [`LinkEvent::ApprovalRequested`]
/// with an approve or deny call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Started { port: u16 },
    Stopped,
    ApprovalRequested { process_id: String },
    ClientConnected { token: Token },
    ClientDisconnected { process_id: String },
    /// A handshake was rejected; `process_id` is empty if the token was unreadable.
    AuthenticationFailed { process_id: String, reason: String },
}
