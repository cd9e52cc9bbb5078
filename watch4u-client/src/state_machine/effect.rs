//! Effects requested by transitions and executed by the interpreter.
//!
//! An effect is a description of work, not the work itself. Transitions
//! stay pure by returning effects; the interpreter performs them and turns
//! their results into new events.

use super::state::{
    CapturedImage, ExamId, OperationId, Roster, TagSerial, UserId, VerifiedCandidate,
};

/// Log severity carried by [`Effect::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch the roster snapshot for an exam.
    FetchRoster {
        operation_id: OperationId,
        exam_id: ExamId,
    },
    /// Ask the verifier whether this tag checks the candidate in.
    VerifyTag {
        operation_id: OperationId,
        roster: Roster,
        user_id: UserId,
        tag: TagSerial,
    },
    /// Run the two-phase selfie submission for a verified candidate.
    SubmitSelfie {
        operation_id: OperationId,
        exam_id: ExamId,
        candidate: VerifiedCandidate,
        image: CapturedImage,
    },
    /// Record a completed check-in in the local history.
    RecordCheckIn {
        exam_id: ExamId,
        candidate: VerifiedCandidate,
        image_url: Option<String>,
    },
    /// Emit a log line.
    Log { level: LogLevel, message: String },
}
