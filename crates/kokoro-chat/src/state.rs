//! Turn state machine with thread-safe transitions.
//!
//! Enforces the turn lifecycle:
//! - Idle -> Listening (talk control pressed)
//! - Listening -> Transcribing (capture ended)
//! - Transcribing -> Generating (non-empty transcript)
//! - Generating -> Speaking (reply received, voice enabled)
//! - Speaking -> Idle (playback ended or failed)
//! - Idle -> Generating (typed message)
//! - Idle -> Speaking (greeting)
//! - Listening/Transcribing/Generating -> Idle (failure, empty input, voice off)

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kokoro_core::types::TurnState;

use crate::error::ChatError;

/// Identifies the turn admitted by one [`StateMachine::begin`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnId(u64);

#[derive(Debug, Default)]
struct Slot {
    state: TurnState,
    /// Id of the latest admitted turn; it owns the state until Idle.
    turn: u64,
}

/// Thread-safe holder of the session's single [`TurnState`].
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    slot: Arc<Mutex<Slot>>,
}

impl StateMachine {
    /// Create a new state machine initialized to `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current state.
    pub fn current(&self) -> TurnState {
        self.lock().state
    }

    /// Start a new turn at `entry`.
    ///
    /// Fails with `ChatError::Busy` unless the pipeline is `Idle`.
    pub fn begin(&self, entry: TurnState) -> Result<TurnId, ChatError> {
        let mut slot = self.lock();
        if slot.state != TurnState::Idle {
            return Err(ChatError::Busy(slot.state));
        }
        Self::apply(&mut slot.state, entry)?;
        slot.turn += 1;
        Ok(TurnId(slot.turn))
    }

    /// Attempt to transition to the target state, returning the prior state.
    pub fn transition(&self, target: TurnState) -> Result<TurnState, ChatError> {
        Self::apply(&mut self.lock().state, target)
    }

    fn apply(state: &mut TurnState, target: TurnState) -> Result<TurnState, ChatError> {
        let from = *state;
        if from.can_transition_to(&target) {
            tracing::debug!(from = %from, to = %target, "Turn state changed");
            *state = target;
            Ok(from)
        } else {
            Err(ChatError::InvalidTransition { from, to: target })
        }
    }

    /// Whether `turn` is the turn currently holding a non-Idle state.
    pub fn owns(&self, turn: TurnId) -> bool {
        let slot = self.lock();
        slot.turn == turn.0 && slot.state != TurnState::Idle
    }

    /// Force `turn` back to Idle, returning the abandoned state.
    ///
    /// Does nothing once `turn` has reached Idle on its own, so a finished
    /// turn can never reset a later one.
    pub fn release(&self, turn: TurnId) -> Option<TurnState> {
        let mut slot = self.lock();
        if slot.turn != turn.0 || slot.state == TurnState::Idle {
            return None;
        }
        let from = slot.state;
        tracing::warn!(from = %from, turn = turn.0, "Abandoned turn reset to Idle");
        slot.state = TurnState::Idle;
        Some(from)
    }
}

// =============================================================================
// Tests
// =============================================================================
