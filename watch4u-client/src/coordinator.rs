//! The check-in coordinator: the outward face of the desk agent.
//!
//! Wraps the state machine and interpreter behind four operations (start,
//! submit a tag scan, submit a selfie, cancel) and enforces the
//! concurrency rules: one attempt at a time, one operation in flight at a
//! time, and a result applied only while its operation is still the live
//! one. The state lock is never held across a collaborator call, so a
//! cancel can always get in ahead of a slow verification or upload.

use tokio::sync::Mutex;
use tracing::info;

use crate::state_machine::event::Event;
use crate::state_machine::interpreter::{execute_effects, EffectContext};
use crate::state_machine::state::{
    BlockReason, CancellationReason, CapturedImage, CheckInState, ExamId, FailureCause,
    OperationId, RejectionReason, RosterFetchOutcome, SelfieOutcome, TagAssessment, TagSerial,
    UserId,
};
use crate::state_machine::transition::{start_check_in, transition};

/// Errors surfaced by coordinator operations.
#[derive(Debug)]
pub enum CheckInError {
    /// The operation does not apply to the current state. The attempt, if
    /// any, is untouched.
    InvalidStateTransition {
        operation: &'static str,
        state: String,
    },
    /// The scanned tag was refused. `RejectionReason::is_unrecoverable`
    /// says whether another scan can still succeed.
    Rejected(RejectionReason),
    /// A network or server fault. The attempt survives and the operation
    /// may be retried.
    TransientFailure(FailureCause),
    /// The auth session lapsed; the attempt is blocked until a new login.
    SessionExpired,
}

impl std::fmt::Display for CheckInError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckInError::InvalidStateTransition { operation, state } => {
                write!(f, "{} is not valid while {}", operation, state)
            }
            CheckInError::Rejected(reason) => write!(f, "tag rejected: {}", reason),
            CheckInError::TransientFailure(cause) => write!(f, "transient failure: {}", cause),
            CheckInError::SessionExpired => write!(f, "session expired; sign in again"),
        }
    }
}

impl std::error::Error for CheckInError {}

fn invalid(operation: &'static str, state: impl Into<String>) -> CheckInError {
    CheckInError::InvalidStateTransition {
        operation,
        state: state.into(),
    }
}

/// Drives check-in attempts for one desk.
pub struct CheckInCoordinator {
    active: Mutex<Option<CheckInState>>,
    ctx: EffectContext,
}

impl CheckInCoordinator {
    pub fn new(ctx: EffectContext) -> Self {
        Self {
            active: Mutex::new(None),
            ctx,
        }
    }

    /// Current state of the active attempt, if any.
    pub async fn state(&self) -> Option<CheckInState> {
        self.active.lock().await.clone()
    }

    /// Begin a check-in attempt by `user_id` for `exam_id`.
    ///
    /// Any live attempt is superseded: the new attempt takes the slot and
    /// the old attempt's pending operations resolve as cancelled. Returns
    /// the state once the roster fetch resolves. A candidate whose roster
    /// entry already carries a check-in time is blocked here, before any
    /// tag scan is offered.
    pub async fn start(
        &self,
        exam_id: ExamId,
        user_id: UserId,
    ) -> Result<CheckInState, CheckInError> {
        let operation_id = OperationId::new();

        let result = start_check_in(exam_id.clone(), user_id, operation_id.clone());
        let effects = {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.as_ref() {
                if !previous.is_terminal() {
                    info!(
                        "Superseding check-in for exam {} ({})",
                        previous.exam_id(),
                        previous.describe()
                    );
                }
            }
            *active = Some(result.state);
            result.effects
        };

        let events = execute_effects(&self.ctx, effects).await;

        let outcome = events
            .into_iter()
            .find_map(|event| match event {
                Event::RosterFetched {
                    operation_id: op,
                    outcome,
                } if op == operation_id => Some(outcome),
                _ => None,
            })
            .unwrap_or_else(|| {
                RosterFetchOutcome::Failed(FailureCause::Internal(
                    "roster fetch produced no result".to_string(),
                ))
            });

        let applied = self
            .apply_result(
                &operation_id,
                Event::RosterFetched {
                    operation_id: operation_id.clone(),
                    outcome: outcome.clone(),
                },
            )
            .await;

        match applied {
            None => Ok(self.overtaken(exam_id).await),
            Some(state) => match outcome {
                // A loaded roster can still refuse the candidate outright
                RosterFetchOutcome::Loaded(_) => match state {
                    CheckInState::Blocked {
                        reason: BlockReason::AlreadyCheckedIn,
                        ..
                    } => Err(CheckInError::Rejected(RejectionReason::AlreadyCheckedIn)),
                    state => Ok(state),
                },
                RosterFetchOutcome::Failed(cause) => Err(CheckInError::TransientFailure(cause)),
                RosterFetchOutcome::SessionExpired => Err(CheckInError::SessionExpired),
            },
        }
    }

    /// Submit a scanned tag for the active attempt.
    ///
    /// Valid only while the attempt is awaiting a tag; a second scan
    /// arriving while a verification is in flight is refused.
    pub async fn submit_tag_scan(&self, tag: TagSerial) -> Result<CheckInState, CheckInError> {
        let operation_id = OperationId::new();

        let (effects, exam_id) = {
            let mut active = self.active.lock().await;
            let state = match active.take() {
                Some(state) => state,
                None => return Err(invalid("submit_tag_scan", "there is no active check-in")),
            };
            if !matches!(state, CheckInState::AwaitingTag { .. }) {
                let description = state.describe();
                *active = Some(state);
                return Err(invalid("submit_tag_scan", description));
            }
            let exam_id = state.exam_id().clone();
            let result = transition(
                state,
                Event::TagScanSubmitted {
                    operation_id: operation_id.clone(),
                    tag,
                },
            );
            *active = Some(result.state);
            (result.effects, exam_id)
        };

        let events = execute_effects(&self.ctx, effects).await;

        let assessment = events
            .into_iter()
            .find_map(|event| match event {
                Event::TagVerified {
                    operation_id: op,
                    assessment,
                } if op == operation_id => Some(assessment),
                _ => None,
            })
            .unwrap_or_else(|| {
                TagAssessment::Failed(FailureCause::Internal(
                    "verification produced no result".to_string(),
                ))
            });

        let applied = self
            .apply_result(
                &operation_id,
                Event::TagVerified {
                    operation_id: operation_id.clone(),
                    assessment: assessment.clone(),
                },
            )
            .await;

        match applied {
            None => Ok(self.overtaken(exam_id).await),
            Some(state) => match assessment {
                TagAssessment::Verified(_) => Ok(state),
                TagAssessment::Rejected(reason) => Err(CheckInError::Rejected(reason)),
                TagAssessment::Failed(cause) => Err(CheckInError::TransientFailure(cause)),
                TagAssessment::SessionExpired => Err(CheckInError::SessionExpired),
            },
        }
    }

    /// Submit the captured selfie for the verified candidate.
    pub async fn submit_selfie(&self, image: CapturedImage) -> Result<CheckInState, CheckInError> {
        let operation_id = OperationId::new();

        let (effects, exam_id) = {
            let mut active = self.active.lock().await;
            let state = match active.take() {
                Some(state) => state,
                None => return Err(invalid("submit_selfie", "there is no active check-in")),
            };
            if !matches!(state, CheckInState::AwaitingSelfie { .. }) {
                let description = state.describe();
                *active = Some(state);
                return Err(invalid("submit_selfie", description));
            }
            let exam_id = state.exam_id().clone();
            let result = transition(
                state,
                Event::SelfieSubmitted {
                    operation_id: operation_id.clone(),
                    image,
                },
            );
            *active = Some(result.state);
            (result.effects, exam_id)
        };

        let events = execute_effects(&self.ctx, effects).await;

        let outcome = events
            .into_iter()
            .find_map(|event| match event {
                Event::SelfieResolved {
                    operation_id: op,
                    outcome,
                } if op == operation_id => Some(outcome),
                _ => None,
            })
            .unwrap_or_else(|| {
                SelfieOutcome::Failed(FailureCause::Internal(
                    "selfie submission produced no result".to_string(),
                ))
            });

        let applied = self
            .apply_result(
                &operation_id,
                Event::SelfieResolved {
                    operation_id: operation_id.clone(),
                    outcome: outcome.clone(),
                },
            )
            .await;

        match applied {
            None => Ok(self.overtaken(exam_id).await),
            Some(state) => match outcome {
                SelfieOutcome::Accepted { .. } => Ok(state),
                SelfieOutcome::Failed(cause) => Err(CheckInError::TransientFailure(cause)),
                SelfieOutcome::SessionExpired => Err(CheckInError::SessionExpired),
            },
        }
    }

    /// Cancel the active attempt.
    ///
    /// Idempotent: cancelling a settled attempt leaves it as it is.
    /// Returns the resulting state, or None when no attempt exists.
    pub async fn cancel(&self) -> Option<CheckInState> {
        let (state, effects) = {
            let mut active = self.active.lock().await;
            let state = active.take()?;
            let result = transition(
                state,
                Event::CancelRequested {
                    reason: CancellationReason::UserRequested,
                },
            );
            let state = result.state.clone();
            *active = Some(result.state);
            (state, result.effects)
        };

        // A cancel only ever produces log effects
        execute_effects(&self.ctx, effects).await;

        Some(state)
    }

    /// Apply a result event to the active attempt.
    ///
    /// The event always goes through the transition function, so a stale
    /// result is logged by the state's own handler. The return value says
    /// whether the event still belonged to the live operation; `None`
    /// means the operation was overtaken by a cancel or a newer attempt.
    async fn apply_result(&self, operation_id: &OperationId, event: Event) -> Option<CheckInState> {
        let (applied, state, effects) = {
            let mut active = self.active.lock().await;
            let state = active.take()?;
            let applied = state.operation_id() == Some(operation_id);
            let result = transition(state, event);
            let state = result.state.clone();
            *active = Some(result.state);
            (applied, state, result.effects)
        };

        execute_effects(&self.ctx, effects).await;

        applied.then_some(state)
    }

    /// The state reported to a caller whose operation was overtaken.
    ///
    /// After a plain cancel the slot holds the terminal state to report.
    /// After a supersession the slot already belongs to the new attempt,
    /// so the old one is reported as cancelled in its favour.
    async fn overtaken(&self, exam_id: ExamId) -> CheckInState {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(state @ CheckInState::Cancelled { .. }) => state.clone(),
            _ => CheckInState::Cancelled {
                exam_id,
                reason: CancellationReason::Superseded,
            },
        }
    }
}
