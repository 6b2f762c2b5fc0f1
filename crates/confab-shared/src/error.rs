use thiserror::Error;

/// Failure reported by the daemon boundary when a command is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("Daemon rejected {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },

    #[error("Daemon unavailable")]
    Unavailable,

    #[error("Unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

/// Errors surfaced by call commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Call ID is empty")]
    EmptyCallId,

    #[error("Call not allowed")]
    NotAllowed,

    #[error("Unknown call: {0}")]
    UnknownCall(String),

    #[error("Boundary error: {0}")]
    Boundary(#[from] BoundaryError),

    #[error("Session closed")]
    SessionClosed,
}

/// Errors surfaced by history loads. Cloneable so one failure can resolve
/// every waiter on a shared load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Boundary error: {0}")]
    Boundary(#[from] BoundaryError),

    #[error("Load interrupted")]
    Interrupted,

    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("Session closed")]
    SessionClosed,
}

/// Errors surfaced by conversation commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("Boundary error: {0}")]
    Boundary(#[from] BoundaryError),

    #[error("Session closed")]
    SessionClosed,
}

#[derive(Error, Debug)]
pub enum ConfabError {
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Boundary error: {0}")]
    Boundary(#[from] BoundaryError),

    #[error("Configuration error: {0}")]
    Config(String),
}
