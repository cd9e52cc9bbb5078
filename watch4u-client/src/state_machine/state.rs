//! State types for a single check-in attempt.
//!
//! One attempt walks a candidate from tag scan to completed check-in. The
//! state is pure data; transitions over it live in the `transition` module.

use std::fmt;

use uuid::Uuid;
use watch4u_core::api::RosterEntry;
use watch4u_core::ApiError;

/// Identifier of the exam being checked into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExamId(pub String);

impl fmt::Display for ExamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExamId {
    fn from(s: &str) -> Self {
        ExamId(s.to_string())
    }
}

/// Candidate identifier as the roster reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

/// Serial number read from an NFC tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagSerial(pub String);

impl fmt::Display for TagSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TagSerial {
    fn from(s: &str) -> Self {
        TagSerial(s.to_string())
    }
}

/// Identity of one in-flight operation.
///
/// Result events carry the operation they belong to, so a result that
/// arrives after its operation was cancelled or retried matches nothing
/// and is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters, for logs.
    pub fn short(&self) -> String {
        let full = self.0.to_string();
        full[..8.min(full.len())].to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Roster snapshot taken when the attempt starts.
///
/// Later roster changes on the server do not affect an attempt that is
/// already underway.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// The candidate the tag is bound to, if any.
    pub fn user_for_tag(&self, tag: &TagSerial) -> Option<UserId> {
        self.entries
            .iter()
            .find(|entry| entry.tag_serial_number.as_deref() == Some(tag.0.as_str()))
            .map(|entry| UserId(entry.id.clone()))
    }

    pub fn entry_for_user(&self, user_id: &UserId) -> Option<&RosterEntry> {
        self.entries.iter().find(|entry| entry.id == user_id.0)
    }
}

/// Why a tag scan was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// The tag is not bound to any candidate.
    UnassignedTag,
    /// The candidate being checked in is not on this exam's roster.
    UserNotInRoster,
    /// The candidate already has a recorded check-in.
    AlreadyCheckedIn,
}

impl RejectionReason {
    /// A rejection the operator cannot recover from by scanning again.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, RejectionReason::AlreadyCheckedIn)
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::UnassignedTag => write!(f, "tag is not assigned to any candidate"),
            RejectionReason::UserNotInRoster => {
                write!(f, "candidate is not on the roster for this exam")
            }
            RejectionReason::AlreadyCheckedIn => write!(f, "candidate has already checked in"),
        }
    }
}

/// Why an operation could not produce an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The request never completed.
    Network(String),
    /// The server answered with an unexpected status.
    Server { code: u16, message: String },
    /// The response decoded to something unusable.
    BadResponse(String),
    /// The round-trip exceeded the configured deadline.
    Timeout,
    /// A result was expected but never surfaced.
    Internal(String),
}

impl FailureCause {
    /// Classify an API error that was not a session expiry.
    pub fn from_api(err: ApiError) -> Self {
        match err {
            ApiError::Network(detail) => FailureCause::Network(detail),
            ApiError::Status { code, message } => FailureCause::Server { code, message },
            ApiError::Decode(detail) => FailureCause::BadResponse(detail),
            ApiError::Timeout => FailureCause::Timeout,
            ApiError::Unauthorized => {
                FailureCause::Internal("session expiry reached failure classification".to_string())
            }
            ApiError::Credentials(message) => FailureCause::Internal(message),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Network(detail) => write!(f, "network failure: {}", detail),
            FailureCause::Server { code, message } => {
                write!(f, "server answered {}: {}", code, message)
            }
            FailureCause::BadResponse(detail) => write!(f, "unusable response: {}", detail),
            FailureCause::Timeout => write!(f, "timed out"),
            FailureCause::Internal(detail) => write!(f, "internal error: {}", detail),
        }
    }
}

/// Why a dead attempt can no longer continue.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockReason {
    /// The candidate already has a recorded check-in.
    AlreadyCheckedIn,
    /// The roster could not be fetched to start the attempt.
    RosterUnavailable(FailureCause),
    /// The sign-in session was rejected while the attempt was live.
    SessionExpired,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::AlreadyCheckedIn => write!(f, "candidate has already checked in"),
            BlockReason::RosterUnavailable(cause) => {
                write!(f, "roster could not be fetched: {}", cause)
            }
            BlockReason::SessionExpired => write!(f, "sign-in session expired"),
        }
    }
}

/// Why an attempt was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationReason {
    /// The operator abandoned the attempt.
    UserRequested,
    /// A new attempt replaced this one.
    Superseded,
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancellationReason::UserRequested => write!(f, "cancelled by the operator"),
            CancellationReason::Superseded => write!(f, "superseded by a new check-in"),
        }
    }
}

/// Candidate whose tag passed verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCandidate {
    pub user_id: UserId,
    pub email: String,
    pub seat: Option<String>,
    pub tag: TagSerial,
}

/// Photo captured at the desk, ready for upload.
#[derive(Clone, PartialEq)]
pub struct CapturedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Result of fetching the roster at the start of an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterFetchOutcome {
    Loaded(Roster),
    Failed(FailureCause),
    SessionExpired,
}

/// Verdict on a scanned tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TagAssessment {
    Verified(VerifiedCandidate),
    Rejected(RejectionReason),
    Failed(FailureCause),
    SessionExpired,
}

/// Result of the two-phase selfie submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SelfieOutcome {
    Accepted { image_url: Option<String> },
    Failed(FailureCause),
    SessionExpired,
}

/// State of one check-in attempt by one candidate for one exam.
///
/// `Starting`, `VerifyingTag`, and `SubmittingSelfie` have an operation in
/// flight and record its identity. `Complete`, `Blocked`, and `Cancelled`
/// are terminal; nothing moves an attempt out of them.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckInState {
    /// The roster fetch is in flight; the attempt is not ready for a tag.
    Starting {
        exam_id: ExamId,
        user_id: UserId,
        operation_id: OperationId,
    },
    /// Ready for a tag scan.
    AwaitingTag {
        exam_id: ExamId,
        user_id: UserId,
        roster: Roster,
    },
    /// A scanned tag is being verified.
    VerifyingTag {
        exam_id: ExamId,
        user_id: UserId,
        operation_id: OperationId,
        roster: Roster,
        tag: TagSerial,
    },
    /// The tag was accepted; waiting for the desk photo.
    AwaitingSelfie {
        exam_id: ExamId,
        candidate: VerifiedCandidate,
    },
    /// The selfie submission is in flight.
    SubmittingSelfie {
        exam_id: ExamId,
        operation_id: OperationId,
        candidate: VerifiedCandidate,
        image_name: String,
    },
    /// The candidate is checked in.
    Complete {
        exam_id: ExamId,
        candidate: VerifiedCandidate,
        image_url: Option<String>,
    },
    /// The attempt ended and cannot continue.
    Blocked { exam_id: ExamId, reason: BlockReason },
    /// The attempt was abandoned.
    Cancelled {
        exam_id: ExamId,
        reason: CancellationReason,
    },
}

impl CheckInState {
    pub fn exam_id(&self) -> &ExamId {
        match self {
            CheckInState::Starting { exam_id, .. }
            | CheckInState::AwaitingTag { exam_id, .. }
            | CheckInState::VerifyingTag { exam_id, .. }
            | CheckInState::AwaitingSelfie { exam_id, .. }
            | CheckInState::SubmittingSelfie { exam_id, .. }
            | CheckInState::Complete { exam_id, .. }
            | CheckInState::Blocked { exam_id, .. }
            | CheckInState::Cancelled { exam_id, .. } => exam_id,
        }
    }

    /// Phase name for logs and error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            CheckInState::Starting { .. } => "starting",
            CheckInState::AwaitingTag { .. } => "awaiting tag scan",
            CheckInState::VerifyingTag { .. } => "verifying tag",
            CheckInState::AwaitingSelfie { .. } => "awaiting selfie",
            CheckInState::SubmittingSelfie { .. } => "submitting selfie",
            CheckInState::Complete { .. } => "complete",
            CheckInState::Blocked { .. } => "blocked",
            CheckInState::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether the attempt has finished, for good or ill.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckInState::Complete { .. }
                | CheckInState::Blocked { .. }
                | CheckInState::Cancelled { .. }
        )
    }

    /// The operation this state is waiting on, if any.
    pub fn operation_id(&self) -> Option<&OperationId> {
        match self {
            CheckInState::Starting { operation_id, .. }
            | CheckInState::VerifyingTag { operation_id, .. }
            | CheckInState::SubmittingSelfie { operation_id, .. } => Some(operation_id),
            _ => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.operation_id().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, tag: Option<&str>, checked_in: bool) -> RosterEntry {
        RosterEntry {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            seat: Some(format!("A-{}", id)),
            tag_serial_number: tag.map(|t| t.to_string()),
            check_in_time: checked_in.then(|| "09:02".to_string()),
        }
    }

    fn candidate() -> VerifiedCandidate {
        VerifiedCandidate {
            user_id: UserId::from("7"),
            email: "7@example.com".to_string(),
            seat: Some("A-7".to_string()),
            tag: TagSerial::from("04AB"),
        }
    }

    #[test]
    fn roster_resolves_tags_and_users() {
        let roster = Roster::new(vec![
            entry("1", Some("04AA"), false),
            entry("2", None, false),
        ]);

        assert_eq!(
            roster.user_for_tag(&TagSerial::from("04AA")),
            Some(UserId::from("1"))
        );
        assert_eq!(roster.user_for_tag(&TagSerial::from("FFFF")), None);
        assert!(roster.entry_for_user(&UserId::from("2")).is_some());
        assert!(roster.entry_for_user(&UserId::from("9")).is_none());
    }

    #[test]
    fn terminal_states_are_terminal() {
        let exam_id = ExamId::from("7");
        let complete = CheckInState::Complete {
            exam_id: exam_id.clone(),
            candidate: candidate(),
            image_url: None,
        };
        let blocked = CheckInState::Blocked {
            exam_id: exam_id.clone(),
            reason: BlockReason::AlreadyCheckedIn,
        };
        let cancelled = CheckInState::Cancelled {
            exam_id: exam_id.clone(),
            reason: CancellationReason::UserRequested,
        };
        let awaiting = CheckInState::AwaitingTag {
            exam_id,
            user_id: UserId::from("7"),
            roster: Roster::new(vec![]),
        };

        assert!(complete.is_terminal());
        assert!(blocked.is_terminal());
        assert!(cancelled.is_terminal());
        assert!(!awaiting.is_terminal());
    }

    #[test]
    fn in_flight_states_carry_their_operation() {
        let operation_id = OperationId::new();
        let state = CheckInState::VerifyingTag {
            exam_id: ExamId::from("7"),
            user_id: UserId::from("1"),
            operation_id: operation_id.clone(),
            roster: Roster::new(vec![]),
            tag: TagSerial::from("04AB"),
        };
        assert_eq!(state.operation_id(), Some(&operation_id));
        assert!(state.is_in_flight());

        let awaiting = CheckInState::AwaitingSelfie {
            exam_id: ExamId::from("7"),
            candidate: candidate(),
        };
        assert_eq!(awaiting.operation_id(), None);
        assert!(!awaiting.is_in_flight());
    }

    #[test]
    fn only_already_checked_in_is_unrecoverable() {
        assert!(RejectionReason::AlreadyCheckedIn.is_unrecoverable());
        assert!(!RejectionReason::UnassignedTag.is_unrecoverable());
        assert!(!RejectionReason::UserNotInRoster.is_unrecoverable());
    }

    #[test]
    fn failure_cause_classifies_api_errors() {
        assert_eq!(
            FailureCause::from_api(ApiError::Network("refused".to_string())),
            FailureCause::Network("refused".to_string())
        );
        assert_eq!(
            FailureCause::from_api(ApiError::Status {
                code: 503,
                message: "down".to_string()
            }),
            FailureCause::Server {
                code: 503,
                message: "down".to_string()
            }
        );
        assert_eq!(
            FailureCause::from_api(ApiError::Timeout),
            FailureCause::Timeout
        );
    }

    #[test]
    fn captured_image_debug_hides_the_bytes() {
        let image = CapturedImage {
            file_name: "selfie.jpg".to_string(),
            bytes: vec![0u8; 4096],
        };
        let debug = format!("{:?}", image);
        assert!(debug.contains("selfie.jpg"));
        assert!(debug.contains("4096"));
        assert!(!debug.contains("[0,"));
    }

    #[test]
    fn operation_id_short_is_a_prefix() {
        let operation_id = OperationId::new();
        assert_eq!(operation_id.short().len(), 8);
        assert!(operation_id.to_string().starts_with(&operation_id.short()));
    }
}
