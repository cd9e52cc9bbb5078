//! VerifyingTag state transitions.
//!
//! Exactly one verification is in flight here, identified by the operation
//! id stored in the state. Results carrying any other id are stale and
//! must not move the machine; a cancel wins over a result that has not
//! yet been applied.

use super::TransitionResult;
use crate::state_machine::effect::{Effect, LogLevel};
use crate::state_machine::event::Event;
use crate::state_machine::state::{BlockReason, CheckInState, RejectionReason, TagAssessment};

/// Handle transitions from the VerifyingTag state.
pub fn handle(state: CheckInState, event: Event) -> TransitionResult {
    match (&state, event) {
        // Verification resolved for this scan
        (
            CheckInState::VerifyingTag {
                exam_id,
                user_id,
                operation_id,
                roster,
                tag,
            },
            Event::TagVerified {
                operation_id: event_operation,
                assessment,
            },
        ) if *operation_id == event_operation => match assessment {
            TagAssessment::Verified(candidate) => {
                let message = format!(
                    "Tag {} accepted for {}; awaiting selfie",
                    tag, candidate.email
                );
                TransitionResult::new(
                    CheckInState::AwaitingSelfie {
                        exam_id: exam_id.clone(),
                        candidate,
                    },
                    vec![Effect::Log {
                        level: LogLevel::Info,
                        message,
                    }],
                )
            }

            // An already-checked-in candidate cannot retry with another scan
            TagAssessment::Rejected(RejectionReason::AlreadyCheckedIn) => TransitionResult::new(
                CheckInState::Blocked {
                    exam_id: exam_id.clone(),
                    reason: BlockReason::AlreadyCheckedIn,
                },
                vec![Effect::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "Tag {} belongs to a candidate who has already checked in",
                        tag
                    ),
                }],
            ),

            // Recoverable rejection -> back to waiting with the same roster
            TagAssessment::Rejected(reason) => TransitionResult::new(
                CheckInState::AwaitingTag {
                    exam_id: exam_id.clone(),
                    user_id: user_id.clone(),
                    roster: roster.clone(),
                },
                vec![Effect::Log {
                    level: LogLevel::Info,
                    message: format!("Tag {} rejected: {}", tag, reason),
                }],
            ),

            TagAssessment::Failed(cause) => TransitionResult::new(
                CheckInState::AwaitingTag {
                    exam_id: exam_id.clone(),
                    user_id: user_id.clone(),
                    roster: roster.clone(),
                },
                vec![Effect::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "Verification of tag {} failed: {}; ready for another scan",
                        tag, cause
                    ),
                }],
            ),

            TagAssessment::SessionExpired => TransitionResult::new(
                CheckInState::Blocked {
                    exam_id: exam_id.clone(),
                    reason: BlockReason::SessionExpired,
                },
                vec![Effect::Log {
                    level: LogLevel::Warn,
                    message: "Session expired while verifying a tag".to_string(),
                }],
            ),
        },

        // Result from a superseded scan -> ignore
        (CheckInState::VerifyingTag { .. }, Event::TagVerified { .. }) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: "Ignoring stale verification result in VerifyingTag state".to_string(),
            }],
        ),

        // Cancel while the verification is in flight. Its result, when it
        // arrives, finds a terminal state and is dropped there.
        (CheckInState::VerifyingTag { exam_id, .. }, Event::CancelRequested { reason }) => {
            let message = format!(
                "Cancelling check-in for exam {}; any in-flight verification result will be discarded",
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
        // Stale Events in VerifyingTag State
        // =====================================================================
        (
            CheckInState::VerifyingTag { .. },
            Event::RosterFetched { .. } | Event::SelfieResolved { .. },
        ) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: "Ignoring stale effect result in VerifyingTag state".to_string(),
            }],
        ),

        // Catch-all for unhandled events
        (_, event) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Warn,
                message: format!(
                    "Unhandled event {} in VerifyingTag state",
                    event.log_summary()
                ),
            }],
        ),
    }
}
