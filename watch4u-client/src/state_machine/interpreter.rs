//! Effect interpreter that executes effects against real collaborators.
//!
//! The interpreter is the boundary between the pure state machine and the
//! impure world of I/O. It takes effects (descriptions of what to do) and
//! executes them, returning result events. Every network-facing effect is
//! bounded by `request_timeout`; an elapsed timeout resolves as a failed
//! outcome rather than hanging the attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::effect::{Effect, LogLevel};
use super::event::Event;
use super::state::{
    CapturedImage, ExamId, FailureCause, OperationId, Roster, RosterFetchOutcome, SelfieOutcome,
    TagAssessment, TagSerial, UserId, VerifiedCandidate,
};
use crate::history::{CheckInHistory, CheckInRecord};
use crate::selfie::SelfieSubmitter;
use crate::verifier::{RosterSource, TagVerifier};

/// Collaborators the interpreter needs to execute effects.
#[derive(Clone)]
pub struct EffectContext {
    pub roster_source: Arc<dyn RosterSource>,
    pub verifier: Arc<dyn TagVerifier>,
    pub submitter: Arc<dyn SelfieSubmitter>,
    pub history: Arc<dyn CheckInHistory>,
    /// Upper bound on any single network-facing effect.
    pub request_timeout: Duration,
}

/// Result of executing an effect.
#[derive(Debug)]
pub enum EffectResult {
    /// Effect completed, produced result events.
    Ok(Vec<Event>),
    /// Effect failed with an error.
    Err(String),
}

impl EffectResult {
    pub fn ok(events: Vec<Event>) -> Self {
        Self::Ok(events)
    }

    pub fn single(event: Event) -> Self {
        Self::Ok(vec![event])
    }

    pub fn none() -> Self {
        Self::Ok(vec![])
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self::Err(msg.into())
    }
}

/// Execute a list of effects and collect result events.
///
/// Effects are executed sequentially. If an effect fails, execution continues
/// with remaining effects, and the error is logged.
pub async fn execute_effects(ctx: &EffectContext, effects: Vec<Effect>) -> Vec<Event> {
    let mut result_events = Vec::new();

    for effect in effects {
        match execute_effect(ctx, effect).await {
            EffectResult::Ok(events) => result_events.extend(events),
            EffectResult::Err(err) => {
                error!("Effect execution failed: {}", err);
            }
        }
    }

    result_events
}

/// Execute a single effect.
async fn execute_effect(ctx: &EffectContext, effect: Effect) -> EffectResult {
    match effect {
        Effect::FetchRoster {
            operation_id,
            exam_id,
        } => execute_fetch_roster(ctx, operation_id, &exam_id).await,

        Effect::VerifyTag {
            operation_id,
            roster,
            user_id,
            tag,
        } => execute_verify_tag(ctx, operation_id, &roster, &user_id, &tag).await,

        Effect::SubmitSelfie {
            operation_id,
            exam_id,
            candidate,
            image,
        } => execute_submit_selfie(ctx, operation_id, &exam_id, &candidate, &image).await,

        Effect::RecordCheckIn {
            exam_id,
            candidate,
            image_url,
        } => execute_record_check_in(ctx, exam_id, candidate, image_url).await,

        Effect::Log { level, message } => {
            match level {
                LogLevel::Debug => debug!("{}", message),
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
                LogLevel::Error => error!("{}", message),
            }
            EffectResult::none()
        }
    }
}

/// Fetch the roster snapshot for an exam.
async fn execute_fetch_roster(
    ctx: &EffectContext,
    operation_id: OperationId,
    exam_id: &ExamId,
) -> EffectResult {
    info!("Fetching roster for exam {}", exam_id);

    let outcome = match timeout(ctx.request_timeout, ctx.roster_source.fetch(exam_id)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                "Roster fetch for exam {} timed out after {:?}",
                exam_id, ctx.request_timeout
            );
            RosterFetchOutcome::Failed(FailureCause::Timeout)
        }
    };

    EffectResult::single(Event::RosterFetched {
        operation_id,
        outcome,
    })
}

/// Verify a scanned tag against the roster snapshot.
async fn execute_verify_tag(
    ctx: &EffectContext,
    operation_id: OperationId,
    roster: &Roster,
    user_id: &UserId,
    tag: &TagSerial,
) -> EffectResult {
    debug!("Verifying tag {} for candidate {}", tag, user_id);

    let assessment = match timeout(
        ctx.request_timeout,
        ctx.verifier.verify(roster, user_id, tag),
    )
    .await
    {
        Ok(assessment) => assessment,
        Err(_) => {
            warn!(
                "Verification of tag {} timed out after {:?}",
                tag, ctx.request_timeout
            );
            TagAssessment::Failed(FailureCause::Timeout)
        }
    };

    EffectResult::single(Event::TagVerified {
        operation_id,
        assessment,
    })
}

/// Run the two-phase selfie submission.
async fn execute_submit_selfie(
    ctx: &EffectContext,
    operation_id: OperationId,
    exam_id: &ExamId,
    candidate: &VerifiedCandidate,
    image: &CapturedImage,
) -> EffectResult {
    info!(
        "Submitting selfie {} for {}",
        image.file_name, candidate.email
    );

    let outcome = match timeout(
        ctx.request_timeout,
        ctx.submitter.submit(exam_id, candidate, image),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                "Selfie submission for {} timed out after {:?}",
                candidate.email, ctx.request_timeout
            );
            SelfieOutcome::Failed(FailureCause::Timeout)
        }
    };

    EffectResult::single(Event::SelfieResolved {
        operation_id,
        outcome,
    })
}

/// Persist a completed check-in to local history.
///
/// History is best-effort: a storage failure is logged and does not
/// produce an event, so the completed attempt stands.
async fn execute_record_check_in(
    ctx: &EffectContext,
    exam_id: ExamId,
    candidate: VerifiedCandidate,
    image_url: Option<String>,
) -> EffectResult {
    let record = CheckInRecord {
        exam_id: exam_id.0,
        user_id: candidate.user_id.0,
        email: candidate.email,
        seat: candidate.seat,
        tag_serial: candidate.tag.0,
        image_url,
        completed_at: Utc::now(),
    };
    let email = record.email.clone();

    match ctx.history.record(record).await {
        Ok(()) => EffectResult::none(),
        Err(e) => EffectResult::err(format!("Failed to record check-in for {}: {}", email, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryError;
    use async_trait::async_trait;

    struct PendingRosterSource;

    #[async_trait]
    impl RosterSource for PendingRosterSource {
        async fn fetch(&self, _exam_id: &ExamId) -> RosterFetchOutcome {
            std::future::pending().await
        }
    }

    struct RejectingVerifier;

    #[async_trait]
    impl TagVerifier for RejectingVerifier {
        async fn verify(
            &self,
            _roster: &Roster,
            _user_id: &UserId,
            _tag: &TagSerial,
        ) -> TagAssessment {
            TagAssessment::Failed(FailureCause::Internal("unused".to_string()))
        }
    }

    struct NoopSubmitter;

    #[async_trait]
    impl SelfieSubmitter for NoopSubmitter {
        async fn submit(
            &self,
            _exam_id: &ExamId,
            _candidate: &VerifiedCandidate,
            _image: &CapturedImage,
        ) -> SelfieOutcome {
            SelfieOutcome::Accepted { image_url: None }
        }
    }

    struct FailingHistory;

    #[async_trait]
    impl CheckInHistory for FailingHistory {
        async fn record(&self, _record: CheckInRecord) -> Result<(), HistoryError> {
            Err(HistoryError::storage("insert", "disk full"))
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<CheckInRecord>, HistoryError> {
            Ok(vec![])
        }

        async fn for_exam(&self, _exam_id: &str) -> Result<Vec<CheckInRecord>, HistoryError> {
            Ok(vec![])
        }
    }

    fn make_context() -> EffectContext {
        EffectContext {
            roster_source: Arc::new(PendingRosterSource),
            verifier: Arc::new(RejectingVerifier),
            submitter: Arc::new(NoopSubmitter),
            history: Arc::new(FailingHistory),
            request_timeout: Duration::from_secs(1),
        }
    }

    fn candidate() -> VerifiedCandidate {
        VerifiedCandidate {
            user_id: UserId::from("1"),
            email: "1@example.com".to_string(),
            seat: Some("A-1".to_string()),
            tag: TagSerial::from("04AA"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn roster_fetch_that_hangs_resolves_as_timeout() {
        let ctx = make_context();
        let operation_id = OperationId::new();

        let events = execute_effects(
            &ctx,
            vec![Effect::FetchRoster {
                operation_id: operation_id.clone(),
                exam_id: ExamId::from("7"),
            }],
        )
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::RosterFetched {
                operation_id: op,
                outcome: RosterFetchOutcome::Failed(FailureCause::Timeout),
            } if *op == operation_id
        ));
    }

    #[tokio::test]
    async fn history_failure_produces_no_event() {
        let ctx = make_context();

        let events = execute_effects(
            &ctx,
            vec![Effect::RecordCheckIn {
                exam_id: ExamId::from("7"),
                candidate: candidate(),
                image_url: None,
            }],
        )
        .await;

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn log_effects_produce_no_events() {
        let ctx = make_context();

        let events = execute_effects(
            &ctx,
            vec![Effect::Log {
                level: LogLevel::Info,
                message: "hello".to_string(),
            }],
        )
        .await;

        assert!(events.is_empty());
    }
}
