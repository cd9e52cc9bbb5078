//! Terminal state transitions (Complete, Blocked, Cancelled).

use super::TransitionResult;
use crate::state_machine::effect::{Effect, LogLevel};
use crate::state_machine::event::Event;
use crate::state_machine::state::CheckInState;

/// Handle events arriving in a terminal state (Complete, Blocked, Cancelled).
///
/// Terminal states are stable resting points. A fresh attempt starts from
/// scratch via `start_check_in`, so nothing here can revive this one.
pub fn handle(state: CheckInState, event: Event) -> TransitionResult {
    match (&state, event) {
        // Cancel on a settled attempt -> nothing to cancel
        (_, Event::CancelRequested { .. }) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: format!("Nothing to cancel; check-in is already {}", state.describe()),
            }],
        ),

        // Effect results can arrive after the attempt has settled. All stale.
        (_, event) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: format!(
                    "Ignoring {} in terminal state ({})",
                    event.log_summary(),
                    state.describe()
                ),
            }],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::state::{
        BlockReason, CancellationReason, ExamId, OperationId, TagAssessment, TagSerial, UserId,
        VerifiedCandidate,
    };

    fn make_complete_state() -> CheckInState {
        CheckInState::Complete {
            exam_id: ExamId::from("7"),
            candidate: VerifiedCandidate {
                user_id: UserId::from("1"),
                email: "1@example.com".to_string(),
                seat: Some("A-1".to_string()),
                tag: TagSerial::from("04AA"),
            },
            image_url: None,
        }
    }

    #[test]
    fn test_complete_ignores_late_results() {
        let state = make_complete_state();

        let result = handle(
            state.clone(),
            Event::TagVerified {
                operation_id: OperationId::new(),
                assessment: TagAssessment::SessionExpired,
            },
        );

        assert_eq!(result.state, state);
        assert!(result
            .effects
            .iter()
            .all(|e| matches!(e, Effect::Log { .. })));
    }

    #[test]
    fn test_blocked_absorbs_cancel() {
        let state = CheckInState::Blocked {
            exam_id: ExamId::from("7"),
            reason: BlockReason::AlreadyCheckedIn,
        };

        let result = handle(
            state.clone(),
            Event::CancelRequested {
                reason: CancellationReason::UserRequested,
            },
        );

        assert_eq!(result.state, state);
    }

    #[test]
    fn test_cancelled_is_stable_under_repeat_cancel() {
        let state = CheckInState::Cancelled {
            exam_id: ExamId::from("7"),
            reason: CancellationReason::UserRequested,
        };

        let result = handle(
            state.clone(),
            Event::CancelRequested {
                reason: CancellationReason::Superseded,
            },
        );

        // The original cancellation reason is preserved
        assert_eq!(result.state, state);
    }
}
