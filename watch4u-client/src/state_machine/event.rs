//! Events that drive the check-in state machine.
//!
//! Operation events come from the coordinator when the operator does
//! something; result events come back from the effect interpreter once a
//! collaborator answers.

use super::state::{
    CancellationReason, CapturedImage, OperationId, RosterFetchOutcome, SelfieOutcome,
    TagAssessment, TagSerial,
};

/// External stimulus for the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The roster fetch for `operation_id` resolved.
    RosterFetched {
        operation_id: OperationId,
        outcome: RosterFetchOutcome,
    },
    /// The operator submitted a scanned tag.
    TagScanSubmitted {
        operation_id: OperationId,
        tag: TagSerial,
    },
    /// Tag verification for `operation_id` resolved.
    TagVerified {
        operation_id: OperationId,
        assessment: TagAssessment,
    },
    /// The operator submitted the desk photo.
    SelfieSubmitted {
        operation_id: OperationId,
        image: CapturedImage,
    },
    /// Selfie submission for `operation_id` resolved.
    SelfieResolved {
        operation_id: OperationId,
        outcome: SelfieOutcome,
    },
    /// The attempt should stop where it is.
    CancelRequested { reason: CancellationReason },
}

impl Event {
    /// Short description for logs.
    pub fn log_summary(&self) -> String {
        match self {
            Event::RosterFetched {
                outcome: RosterFetchOutcome::Loaded(roster),
                ..
            } => format!("RosterFetched({} entries)", roster.len()),
            Event::RosterFetched {
                outcome: RosterFetchOutcome::Failed(cause),
                ..
            } => format!("RosterFetched(failed: {})", cause),
            Event::RosterFetched {
                outcome: RosterFetchOutcome::SessionExpired,
                ..
            } => "RosterFetched(session expired)".to_string(),
            Event::TagScanSubmitted { tag, .. } => format!("TagScanSubmitted({})", tag),
            Event::TagVerified {
                assessment: TagAssessment::Verified(candidate),
                ..
            } => format!("TagVerified(verified {})", candidate.user_id),
            Event::TagVerified {
                assessment: TagAssessment::Rejected(reason),
                ..
            } => format!("TagVerified(rejected: {})", reason),
            Event::TagVerified {
                assessment: TagAssessment::Failed(cause),
                ..
            } => format!("TagVerified(failed: {})", cause),
            Event::TagVerified {
                assessment: TagAssessment::SessionExpired,
                ..
            } => "TagVerified(session expired)".to_string(),
            Event::SelfieSubmitted { image, .. } => {
                format!("SelfieSubmitted({})", image.file_name)
            }
            Event::SelfieResolved {
                outcome: SelfieOutcome::Accepted { .. },
                ..
            } => "SelfieResolved(accepted)".to_string(),
            Event::SelfieResolved {
                outcome: SelfieOutcome::Failed(cause),
                ..
            } => format!("SelfieResolved(failed: {})", cause),
            Event::SelfieResolved {
                outcome: SelfieOutcome::SessionExpired,
                ..
            } => "SelfieResolved(session expired)".to_string(),
            Event::CancelRequested { reason } => format!("CancelRequested({})", reason),
        }
    }
}
