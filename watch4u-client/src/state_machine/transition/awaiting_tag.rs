//! AwaitingTag state transitions.
//!
//! The desk is idle here, waiting for a candidate to scan an NFC tag.
//! A scan starts one verification; further scans are refused upstream
//! until the verification resolves.

use super::TransitionResult;
use crate::state_machine::effect::{Effect, LogLevel};
use crate::state_machine::event::Event;
use crate::state_machine::state::CheckInState;

/// Handle transitions from the AwaitingTag state.
pub fn handle(state: CheckInState, event: Event) -> TransitionResult {
    match (&state, event) {
        // Tag scanned -> verify it against the roster snapshot
        (
            CheckInState::AwaitingTag {
                exam_id,
                user_id,
                roster,
            },
            Event::TagScanSubmitted { operation_id, tag },
        ) => TransitionResult::new(
            CheckInState::VerifyingTag {
                exam_id: exam_id.clone(),
                user_id: user_id.clone(),
                operation_id: operation_id.clone(),
                roster: roster.clone(),
                tag: tag.clone(),
            },
            vec![
                Effect::Log {
                    level: LogLevel::Info,
                    message: format!("Verifying tag {} for exam {}", tag, exam_id),
                },
                Effect::VerifyTag {
                    operation_id,
                    roster: roster.clone(),
                    user_id: user_id.clone(),
                    tag,
                },
            ],
        ),

        // Cancel while waiting for a scan
        (CheckInState::AwaitingTag { exam_id, .. }, Event::CancelRequested { reason }) => {
            let message = format!("Cancelling check-in for exam {}: {}", exam_id, reason);
            TransitionResult::new(
                CheckInState::Cancelled {
                    exam_id: exam_id.clone(),
                    reason,
                },
                vec![Effect::Log {
                    level: LogLevel::Info,
                    message,
                }],
            )
        }

        // =====================================================================
        // Stale Events in AwaitingTag State
        // A verification that timed out upstream can still resolve and land
        // here after the attempt has already returned to waiting.
        // =====================================================================
        (
            CheckInState::AwaitingTag { .. },
            Event::RosterFetched { .. } | Event::TagVerified { .. } | Event::SelfieResolved { .. },
        ) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: "Ignoring stale effect result in AwaitingTag state".to_string(),
            }],
        ),

        // Catch-all for unhandled events
        (_, event) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Warn,
                message: format!(
                    "Unhandled event {} in AwaitingTag state",
                    event.log_summary()
                ),
            }],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::state::{
        CancellationReason, ExamId, OperationId, RejectionReason, Roster, TagAssessment, TagSerial,
        UserId,
    };
    use watch4u_core::api::RosterEntry;

    fn make_awaiting_tag_state() -> CheckInState {
        CheckInState::AwaitingTag {
            exam_id: ExamId::from("7"),
            user_id: UserId::from("1"),
            roster: Roster::new(vec![RosterEntry {
                id: "1".to_string(),
                email: "1@example.com".to_string(),
                seat: Some("A-1".to_string()),
                tag_serial_number: Some("04AA".to_string()),
                check_in_time: None,
            }]),
        }
    }

    #[test]
    fn test_tag_scan_starts_verification() {
        let state = make_awaiting_tag_state();
        let operation_id = OperationId::new();

        let result = handle(
            state,
            Event::TagScanSubmitted {
                operation_id: operation_id.clone(),
                tag: TagSerial::from("04AA"),
            },
        );

        match &result.state {
            CheckInState::VerifyingTag {
                operation_id: state_operation,
                tag,
                roster,
                ..
            } => {
                assert_eq!(*state_operation, operation_id);
                assert_eq!(tag.0, "04AA");
                assert_eq!(roster.len(), 1);
            }
            other => panic!("expected VerifyingTag, got {:?}", other),
        }

        assert!(result.effects.iter().any(|e| matches!(
            e,
            Effect::VerifyTag { operation_id: op, .. } if *op == operation_id
        )));
    }

    #[test]
    fn test_late_verification_result_is_ignored() {
        let state = make_awaiting_tag_state();

        let result = handle(
            state.clone(),
            Event::TagVerified {
                operation_id: OperationId::new(),
                assessment: TagAssessment::Rejected(RejectionReason::UnassignedTag),
            },
        );

        assert_eq!(result.state, state);
        assert!(result
            .effects
            .iter()
            .all(|e| matches!(e, Effect::Log { .. })));
    }

    #[test]
    fn test_cancel_returns_cancelled() {
        let state = make_awaiting_tag_state();

        let result = handle(
            state,
            Event::CancelRequested {
                reason: CancellationReason::Superseded,
            },
        );

        assert!(matches!(
            result.state,
            CheckInState::Cancelled {
                reason: CancellationReason::Superseded,
                ..
            }
        ));
    }
}
