//! Tag verification against the roster snapshot.

use std::sync::Arc;

use async_trait::async_trait;

use crate::state_machine::state::{
    ExamId, FailureCause, RejectionReason, Roster, RosterFetchOutcome, TagAssessment, TagSerial,
    UserId, VerifiedCandidate,
};
use watch4u_core::{ApiError, ExamApiClient};

/// Source of roster snapshots for an exam.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch(&self, exam_id: &ExamId) -> RosterFetchOutcome;
}

/// Decides whether a scanned tag checks the candidate in.
#[async_trait]
pub trait TagVerifier: Send + Sync {
    async fn verify(&self, roster: &Roster, user_id: &UserId, tag: &TagSerial) -> TagAssessment;
}

/// Roster snapshots fetched over the exam API.
pub struct ApiRosterSource {
    client: Arc<ExamApiClient>,
}

impl ApiRosterSource {
    pub fn new(client: Arc<ExamApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RosterSource for ApiRosterSource {
    async fn fetch(&self, exam_id: &ExamId) -> RosterFetchOutcome {
        match self.client.fetch_roster(&exam_id.0).await {
            Ok(entries) => RosterFetchOutcome::Loaded(Roster::new(entries)),
            Err(ApiError::Unauthorized) => RosterFetchOutcome::SessionExpired,
            Err(e) => RosterFetchOutcome::Failed(FailureCause::from_api(e)),
        }
    }
}

/// The production verifier: consults the roster snapshot and nothing else.
///
/// No network round-trip happens here, so the verdict is exactly as fresh
/// as the snapshot taken when the attempt started.
pub struct RosterTagVerifier;

#[async_trait]
impl TagVerifier for RosterTagVerifier {
    async fn verify(&self, roster: &Roster, user_id: &UserId, tag: &TagSerial) -> TagAssessment {
        assess_tag(roster, user_id, tag)
    }
}

/// Assess a scanned tag on behalf of the candidate being checked in.
///
/// Checks run in order: the tag must be assigned to someone on this
/// roster, `user_id` must appear in the roster, and that candidate must
/// not have checked in already. Earlier rejections win, so a checked-in
/// candidate scanning an unknown tag is told about the tag. The scanned
/// tag does not have to be the candidate's own; any tag assigned in this
/// roster passes the first check.
pub fn assess_tag(roster: &Roster, user_id: &UserId, tag: &TagSerial) -> TagAssessment {
    if roster.user_for_tag(tag).is_none() {
        return TagAssessment::Rejected(RejectionReason::UnassignedTag);
    }

    let entry = match roster.entry_for_user(user_id) {
        Some(entry) => entry,
        None => return TagAssessment::Rejected(RejectionReason::UserNotInRoster),
    };

    if entry.check_in_time.is_some() {
        return TagAssessment::Rejected(RejectionReason::AlreadyCheckedIn);
    }

    TagAssessment::Verified(VerifiedCandidate {
        user_id: user_id.clone(),
        email: entry.email.clone(),
        seat: entry.seat.clone(),
        tag: tag.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch4u_core::api::RosterEntry;

    fn entry(id: &str, tag: Option<&str>, check_in_time: Option<&str>) -> RosterEntry {
        RosterEntry {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            seat: Some(format!("A-{}", id)),
            tag_serial_number: tag.map(|t| t.to_string()),
            check_in_time: check_in_time.map(|t| t.to_string()),
        }
    }

    #[test]
    fn assigned_tag_of_fresh_candidate_is_verified() {
        let roster = Roster::new(vec![
            entry("1", Some("04AA"), None),
            entry("2", Some("04BB"), None),
        ]);

        let assessment = assess_tag(&roster, &UserId::from("2"), &TagSerial::from("04BB"));

        match assessment {
            TagAssessment::Verified(candidate) => {
                assert_eq!(candidate.user_id.0, "2");
                assert_eq!(candidate.email, "2@example.com");
                assert_eq!(candidate.seat.as_deref(), Some("A-2"));
                assert_eq!(candidate.tag.0, "04BB");
            }
            other => panic!("expected Verified, got {:?}", other),
        }
    }

    #[test]
    fn another_candidates_tag_also_verifies() {
        let roster = Roster::new(vec![
            entry("1", Some("04AA"), None),
            entry("2", Some("04BB"), None),
        ]);

        let assessment = assess_tag(&roster, &UserId::from("1"), &TagSerial::from("04BB"));

        // The candidate's own entry supplies the details, the scan only
        // has to match some assigned tag.
        match assessment {
            TagAssessment::Verified(candidate) => {
                assert_eq!(candidate.user_id.0, "1");
                assert_eq!(candidate.email, "1@example.com");
                assert_eq!(candidate.seat.as_deref(), Some("A-1"));
                assert_eq!(candidate.tag.0, "04BB");
            }
            other => panic!("expected Verified, got {:?}", other),
        }
    }

    #[test]
    fn unknown_tag_is_rejected_as_unassigned() {
        let roster = Roster::new(vec![entry("1", Some("04AA"), None)]);

        let assessment = assess_tag(&roster, &UserId::from("1"), &TagSerial::from("DEADBEEF"));

        assert!(matches!(
            assessment,
            TagAssessment::Rejected(RejectionReason::UnassignedTag)
        ));
    }

    #[test]
    fn candidate_missing_from_the_roster_is_rejected() {
        let roster = Roster::new(vec![entry("1", Some("04AA"), None)]);

        let assessment = assess_tag(&roster, &UserId::from("9"), &TagSerial::from("04AA"));

        assert!(matches!(
            assessment,
            TagAssessment::Rejected(RejectionReason::UserNotInRoster)
        ));
    }

    #[test]
    fn checked_in_candidate_is_rejected() {
        let roster = Roster::new(vec![entry("1", Some("04AA"), Some("09:02"))]);

        let assessment = assess_tag(&roster, &UserId::from("1"), &TagSerial::from("04AA"));

        assert!(matches!(
            assessment,
            TagAssessment::Rejected(RejectionReason::AlreadyCheckedIn)
        ));
    }

    #[test]
    fn unknown_tag_outranks_a_prior_check_in() {
        let roster = Roster::new(vec![entry("1", Some("04AA"), Some("09:02"))]);

        let assessment = assess_tag(&roster, &UserId::from("1"), &TagSerial::from("DEADBEEF"));

        assert!(matches!(
            assessment,
            TagAssessment::Rejected(RejectionReason::UnassignedTag)
        ));
    }

    #[test]
    fn empty_roster_rejects_every_tag() {
        let roster = Roster::new(vec![]);

        let assessment = assess_tag(&roster, &UserId::from("1"), &TagSerial::from("04AA"));

        assert!(matches!(
            assessment,
            TagAssessment::Rejected(RejectionReason::UnassignedTag)
        ));
    }

    #[test]
    fn entry_without_a_tag_never_matches() {
        let roster = Roster::new(vec![entry("1", None, None)]);

        let assessment = assess_tag(&roster, &UserId::from("1"), &TagSerial::from("04AA"));

        assert!(matches!(
            assessment,
            TagAssessment::Rejected(RejectionReason::UnassignedTag)
        ));
    }
}
