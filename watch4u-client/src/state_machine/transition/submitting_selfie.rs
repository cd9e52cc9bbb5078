//! SubmittingSelfie state transitions.
//!
//! The two-phase submission (check-in proof, then image upload) is in
//! flight. A failure of either phase returns to AwaitingSelfie so the
//! desk can retake or resend the photo; the proof phase is idempotent
//! on the server, so a retry never double-counts the check-in.

use super::TransitionResult;
use crate::state_machine::effect::{Effect, LogLevel};
use crate::state_machine::event::Event;
use crate::state_machine::state::{BlockReason, CheckInState, SelfieOutcome};

/// Handle transitions from the SubmittingSelfie state.
pub fn handle(state: CheckInState, event: Event) -> TransitionResult {
    match (&state, event) {
        // Submission resolved for this upload
        (
            CheckInState::SubmittingSelfie {
                exam_id,
                operation_id,
                candidate,
                ..
            },
            Event::SelfieResolved {
                operation_id: event_operation,
                outcome,
            },
        ) if *operation_id == event_operation => match outcome {
            SelfieOutcome::Accepted { image_url } => {
                let message = format!("Check-in complete for {}", candidate.email);
                TransitionResult::new(
                    CheckInState::Complete {
                        exam_id: exam_id.clone(),
                        candidate: candidate.clone(),
                        image_url: image_url.clone(),
                    },
                    vec![
                        Effect::RecordCheckIn {
                            exam_id: exam_id.clone(),
                            candidate: candidate.clone(),
                            image_url,
                        },
                        Effect::Log {
                            level: LogLevel::Info,
                            message,
                        },
                    ],
                )
            }

            // Either phase failed -> back to AwaitingSelfie for a retry
            SelfieOutcome::Failed(cause) => TransitionResult::new(
                CheckInState::AwaitingSelfie {
                    exam_id: exam_id.clone(),
                    candidate: candidate.clone(),
                },
                vec![Effect::Log {
                    level: LogLevel::Warn,
                    message: format!("Selfie submission failed: {}; ready to retry", cause),
                }],
            ),

            SelfieOutcome::SessionExpired => TransitionResult::new(
                CheckInState::Blocked {
                    exam_id: exam_id.clone(),
                    reason: BlockReason::SessionExpired,
                },
                vec![Effect::Log {
                    level: LogLevel::Warn,
                    message: "Session expired while submitting the selfie".to_string(),
                }],
            ),
        },

        // Result from a superseded upload -> ignore
        (CheckInState::SubmittingSelfie { .. }, Event::SelfieResolved { .. }) => {
            TransitionResult::new(
                state.clone(),
                vec![Effect::Log {
                    level: LogLevel::Info,
                    message: "Ignoring stale submission result in SubmittingSelfie state"
                        .to_string(),
                }],
            )
        }

        // Cancel while the upload is in flight
        (CheckInState::SubmittingSelfie { exam_id, .. }, Event::CancelRequested { reason }) => {
            let message = format!(
                "Cancelling check-in for exam {} while the selfie upload is in flight",
                exam_id
            );
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
        // Stale Events in SubmittingSelfie State
        // =====================================================================
        (
            CheckInState::SubmittingSelfie { .. },
            Event::RosterFetched { .. } | Event::TagVerified { .. },
        ) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: "Ignoring stale effect result in SubmittingSelfie state".to_string(),
            }],
        ),

        // Catch-all for unhandled events
        (_, event) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Warn,
                message: format!(
                    "Unhandled event {} in SubmittingSelfie state",
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
        CancellationReason, ExamId, FailureCause, OperationId, TagSerial, UserId, VerifiedCandidate,
    };

    fn make_submitting_state(operation_id: OperationId) -> CheckInState {
        CheckInState::SubmittingSelfie {
            exam_id: ExamId::from("7"),
            operation_id,
            candidate: VerifiedCandidate {
                user_id: UserId::from("1"),
                email: "1@example.com".to_string(),
                seat: Some("A-1".to_string()),
                tag: TagSerial::from("04AA"),
            },
            image_name: "selfie.jpg".to_string(),
        }
    }

    #[test]
    fn test_accepted_submission_completes_and_records() {
        let operation_id = OperationId::new();
        let state = make_submitting_state(operation_id.clone());

        let result = handle(
            state,
            Event::SelfieResolved {
                operation_id,
                outcome: SelfieOutcome::Accepted {
                    image_url: Some("https://cdn.example.com/selfie.jpg".to_string()),
                },
            },
        );

        match &result.state {
            CheckInState::Complete { image_url, .. } => {
                assert_eq!(image_url.as_deref(), Some("https://cdn.example.com/selfie.jpg"));
            }
            other => panic!("expected Complete, got {:?}", other),
        }

        assert!(result.effects.iter().any(|e| matches!(
            e,
            Effect::RecordCheckIn { image_url: Some(url), .. } if url == "https://cdn.example.com/selfie.jpg"
        )));
    }

    #[test]
    fn test_failed_submission_returns_to_awaiting_selfie() {
        let operation_id = OperationId::new();
        let state = make_submitting_state(operation_id.clone());

        let result = handle(
            state,
            Event::SelfieResolved {
                operation_id,
                outcome: SelfieOutcome::Failed(FailureCause::Network("broken pipe".to_string())),
            },
        );

        assert!(matches!(result.state, CheckInState::AwaitingSelfie { .. }));
        assert!(!result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RecordCheckIn { .. })));
    }

    #[test]
    fn test_session_expiry_blocks_the_attempt() {
        let operation_id = OperationId::new();
        let state = make_submitting_state(operation_id.clone());

        let result = handle(
            state,
            Event::SelfieResolved {
                operation_id,
                outcome: SelfieOutcome::SessionExpired,
            },
        );

        assert!(matches!(
            result.state,
            CheckInState::Blocked {
                reason: BlockReason::SessionExpired,
                ..
            }
        ));
    }

    #[test]
    fn test_mismatched_result_is_ignored() {
        let state = make_submitting_state(OperationId::new());

        let result = handle(
            state.clone(),
            Event::SelfieResolved {
                operation_id: OperationId::new(),
                outcome: SelfieOutcome::Accepted { image_url: None },
            },
        );

        assert_eq!(result.state, state);
        assert!(result
            .effects
            .iter()
            .all(|e| matches!(e, Effect::Log { .. })));
    }

    #[test]
    fn test_cancel_during_upload() {
        let state = make_submitting_state(OperationId::new());

        let result = handle(
            state,
            Event::CancelRequested {
                reason: CancellationReason::UserRequested,
            },
        );

        assert!(matches!(result.state, CheckInState::Cancelled { .. }));
    }
}
