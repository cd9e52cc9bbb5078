//! Pure transition function for the check-in state machine.
//!
//! This module implements the core logic as a pure function:
//! `(State, Event) -> (State, Vec<Effect>)`. No I/O happens here; the
//! interpreter executes the returned effects and feeds their results back
//! in as new events. Each state has its own handler module.

mod awaiting_selfie;
mod awaiting_tag;
mod starting;
mod submitting_selfie;
mod terminal;
mod verifying_tag;

use super::effect::{Effect, LogLevel};
use super::event::Event;
use super::state::{CheckInState, ExamId, OperationId, UserId};

/// Next state plus the effects the transition requests.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub state: CheckInState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: CheckInState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }

    /// Keep the current state and request no effects.
    pub fn no_change(state: CheckInState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }
}

/// Begin a new attempt by `user_id` for `exam_id`.
///
/// Returns the initial state and the roster fetch that readies it. The
/// roster is loaded up front so a candidate who already checked in is
/// blocked before any tag scan is permitted.
pub fn start_check_in(
    exam_id: ExamId,
    user_id: UserId,
    operation_id: OperationId,
) -> TransitionResult {
    TransitionResult::new(
        CheckInState::Starting {
            exam_id: exam_id.clone(),
            user_id: user_id.clone(),
            operation_id: operation_id.clone(),
        },
        vec![
            Effect::Log {
                level: LogLevel::Info,
                message: format!(
                    "Starting check-in for candidate {} in exam {}",
                    user_id, exam_id
                ),
            },
            Effect::FetchRoster {
                operation_id,
                exam_id,
            },
        ],
    )
}

/// Compute the next state and effects for `event` in `state`.
pub fn transition(state: CheckInState, event: Event) -> TransitionResult {
    match &state {
        CheckInState::Starting { .. } => starting::handle(state, event),
        CheckInState::AwaitingTag { .. } => awaiting_tag::handle(state, event),
        CheckInState::VerifyingTag { .. } => verifying_tag::handle(state, event),
        CheckInState::AwaitingSelfie { .. } => awaiting_selfie::handle(state, event),
        CheckInState::SubmittingSelfie { .. } => submitting_selfie::handle(state, event),
        CheckInState::Complete { .. }
        | CheckInState::Blocked { .. }
        | CheckInState::Cancelled { .. } => terminal::handle(state, event),
    }
}
