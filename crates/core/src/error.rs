/// Failures that end a conversational turn.
///
/// Only these abort a turn. Malformed stream lines and failed speak calls are
/// logged where they happen and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("backend request failed: {0}")]
    Request(String),
    #[error("response stream broke off: {0}")]
    Transport(String),
    #[error("turn was interrupted")]
    Cancelled,
    #[error("session time is up")]
    Expired,
    #[error("no active session")]
    Inactive,
}

impl TurnError {
    /// Transport-level failures are the ones announced to the user.
    pub fn is_transport(&self) -> bool {
        matches!(self, TurnError::Request(_) | TurnError::Transport(_))
    }
}
