//! AwaitingSelfie state transitions.
//!
//! The candidate's identity is settled; the attempt now needs a photo.
//! This is also the retry point after a failed upload.

use super::TransitionResult;
use crate::state_machine::effect::{Effect, LogLevel};
use crate::state_machine::event::Event;
use crate::state_machine::state::CheckInState;

/// Handle transitions from the AwaitingSelfie state.
pub fn handle(state: CheckInState, event: Event) -> TransitionResult {
    match (&state, event) {
        // Selfie captured -> start the two-phase submission
        (
            CheckInState::AwaitingSelfie { exam_id, candidate },
            Event::SelfieSubmitted {
                operation_id,
                image,
            },
        ) => TransitionResult::new(
            CheckInState::SubmittingSelfie {
                exam_id: exam_id.clone(),
                operation_id: operation_id.clone(),
                candidate: candidate.clone(),
                image_name: image.file_name.clone(),
            },
            vec![
                Effect::Log {
                    level: LogLevel::Info,
                    message: format!("Submitting selfie {} for {}", image.file_name, candidate.email),
                },
                Effect::SubmitSelfie {
                    operation_id,
                    exam_id: exam_id.clone(),
                    candidate: candidate.clone(),
                    image,
                },
            ],
        ),

        // Cancel before the selfie is taken
        (CheckInState::AwaitingSelfie { exam_id, .. }, Event::CancelRequested { reason }) => {
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
        // Stale Events in AwaitingSelfie State
        // A duplicate verification result can arrive here after the attempt
        // has already advanced past the tag step.
        // =====================================================================
        (
            CheckInState::AwaitingSelfie { .. },
            Event::RosterFetched { .. } | Event::TagVerified { .. } | Event::SelfieResolved { .. },
        ) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: "Ignoring stale effect result in AwaitingSelfie state".to_string(),
            }],
        ),

        // Catch-all for unhandled events
        (_, event) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Warn,
                message: format!(
                    "Unhandled event {} in AwaitingSelfie state",
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
        CancellationReason, CapturedImage, ExamId, OperationId, TagAssessment, TagSerial, UserId,
        VerifiedCandidate,
    };

    fn make_awaiting_selfie_state() -> CheckInState {
        CheckInState::AwaitingSelfie {
            exam_id: ExamId::from("7"),
            candidate: VerifiedCandidate {
                user_id: UserId::from("1"),
                email: "1@example.com".to_string(),
                seat: Some("A-1".to_string()),
                tag: TagSerial::from("04AA"),
            },
        }
    }

    #[test]
    fn test_selfie_submission_starts_upload() {
        let state = make_awaiting_selfie_state();
        let operation_id = OperationId::new();

        let result = handle(
            state,
            Event::SelfieSubmitted {
                operation_id: operation_id.clone(),
                image: CapturedImage {
                    file_name: "selfie.jpg".to_string(),
                    bytes: vec![0xFF, 0xD8],
                },
            },
        );

        match &result.state {
            CheckInState::SubmittingSelfie {
                operation_id: state_operation,
                image_name,
                ..
            } => {
                assert_eq!(*state_operation, operation_id);
                assert_eq!(image_name, "selfie.jpg");
            }
            other => panic!("expected SubmittingSelfie, got {:?}", other),
        }

        assert!(result.effects.iter().any(|e| matches!(
            e,
            Effect::SubmitSelfie { operation_id: op, .. } if *op == operation_id
        )));
    }

    #[test]
    fn test_duplicate_verification_result_is_ignored() {
        let state = make_awaiting_selfie_state();

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
    fn test_cancel_before_submission() {
        let state = make_awaiting_selfie_state();

        let result = handle(
            state,
            Event::CancelRequested {
                reason: CancellationReason::UserRequested,
            },
        );

        assert!(matches!(result.state, CheckInState::Cancelled { .. }));
    }
}
