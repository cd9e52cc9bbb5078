//! Starting state transitions.
//!
//! The attempt sits here while its roster fetch is in flight. The roster
//! snapshot taken now is the one every tag verification of this attempt
//! reads from; later server-side changes are not observed.

use super::TransitionResult;
use crate::state_machine::effect::{Effect, LogLevel};
use crate::state_machine::event::Event;
use crate::state_machine::state::{BlockReason, CheckInState, RosterFetchOutcome};

/// Handle transitions from the Starting state.
pub fn handle(state: CheckInState, event: Event) -> TransitionResult {
    match (&state, event) {
        // Roster result for this fetch -> ready for tag scans, or blocked
        (
            CheckInState::Starting {
                exam_id,
                user_id,
                operation_id,
            },
            Event::RosterFetched {
                operation_id: event_operation,
                outcome,
            },
        ) if *operation_id == event_operation => match outcome {
            RosterFetchOutcome::Loaded(roster) => {
                let already_checked_in = roster
                    .entry_for_user(user_id)
                    .is_some_and(|entry| entry.check_in_time.is_some());
                if already_checked_in {
                    // The snapshot says this candidate is done; never offer a scan.
                    let message = format!(
                        "Candidate {} has already checked in to exam {}",
                        user_id, exam_id
                    );
                    TransitionResult::new(
                        CheckInState::Blocked {
                            exam_id: exam_id.clone(),
                            reason: BlockReason::AlreadyCheckedIn,
                        },
                        vec![Effect::Log {
                            level: LogLevel::Warn,
                            message,
                        }],
                    )
                } else {
                    let message = format!(
                        "Roster loaded for exam {} ({} candidates)",
                        exam_id,
                        roster.len()
                    );
                    TransitionResult::new(
                        CheckInState::AwaitingTag {
                            exam_id: exam_id.clone(),
                            user_id: user_id.clone(),
                            roster,
                        },
                        vec![Effect::Log {
                            level: LogLevel::Info,
                            message,
                        }],
                    )
                }
            }
            RosterFetchOutcome::Failed(cause) => {
                let message = format!("Roster fetch failed for exam {}: {}", exam_id, cause);
                TransitionResult::new(
                    CheckInState::Blocked {
                        exam_id: exam_id.clone(),
                        reason: BlockReason::RosterUnavailable(cause),
                    },
                    vec![Effect::Log {
                        level: LogLevel::Warn,
                        message,
                    }],
                )
            }
            RosterFetchOutcome::SessionExpired => TransitionResult::new(
                CheckInState::Blocked {
                    exam_id: exam_id.clone(),
                    reason: BlockReason::SessionExpired,
                },
                vec![Effect::Log {
                    level: LogLevel::Warn,
                    message: "Session expired while fetching the roster".to_string(),
                }],
            ),
        },

        // Roster result from a superseded fetch -> ignore
        (CheckInState::Starting { .. }, Event::RosterFetched { .. }) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: "Ignoring stale roster result in Starting state".to_string(),
            }],
        ),

        // Cancel while the roster fetch is in flight
        (CheckInState::Starting { exam_id, .. }, Event::CancelRequested { reason }) => {
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

        // Catch-all for unhandled events
        (_, event) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Warn,
                message: format!("Unhandled event {} in Starting state", event.log_summary()),
            }],
        ),
    }
}
