//! Error types for the turn pipeline.

use kokoro_core::types::TurnState;

/// Rejections returned to the caller that triggered a turn.
///
/// Backend and device failures are not reported here; the pipeline recovers
/// from them and reports a `TurnOutcome` instead.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("a turn is already in progress ({0})")]
    Busy(TurnState),
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("no capture in progress")]
    NotListening,
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: TurnState, to: TurnState },
}
