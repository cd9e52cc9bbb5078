//! Two-phase selfie submission.
//!
//! A check-in concludes with two server calls in a fixed order: the NFC
//! check-in proof, then the image upload. The proof is idempotent on the
//! server, which is what makes retrying a half-done submission safe.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::state_machine::state::{
    CapturedImage, ExamId, FailureCause, SelfieOutcome, VerifiedCandidate,
};
use watch4u_core::{ApiError, ExamApiClient};

/// Submits a verified candidate's selfie, concluding the check-in.
#[async_trait]
pub trait SelfieSubmitter: Send + Sync {
    async fn submit(
        &self,
        exam_id: &ExamId,
        candidate: &VerifiedCandidate,
        image: &CapturedImage,
    ) -> SelfieOutcome;
}

/// The wire calls the two submission phases are made of.
#[async_trait]
pub trait SelfieTransport: Send + Sync {
    /// Record the NFC check-in proof. The server treats repeats for the
    /// same candidate as a single check-in.
    async fn record_proof(
        &self,
        exam_id: &str,
        user_id: &str,
        tag_serial: &str,
    ) -> Result<(), ApiError>;

    /// Store the selfie and return its public URL.
    async fn store_image(
        &self,
        exam_id: &str,
        user_id: &str,
        image: &CapturedImage,
    ) -> Result<String, ApiError>;
}

#[async_trait]
impl SelfieTransport for ExamApiClient {
    async fn record_proof(
        &self,
        exam_id: &str,
        user_id: &str,
        tag_serial: &str,
    ) -> Result<(), ApiError> {
        self.confirm_nfc(exam_id, user_id, tag_serial).await
    }

    async fn store_image(
        &self,
        exam_id: &str,
        user_id: &str,
        image: &CapturedImage,
    ) -> Result<String, ApiError> {
        self.upload_image(exam_id, user_id, &image.file_name, image.bytes.clone())
            .await
    }
}

/// Production submitter: proof first, then the image.
///
/// A phase-one failure aborts the submission before any upload happens.
/// A phase-two failure leaves the proof in place; there is no rollback,
/// and a retry re-sends both phases.
pub struct ApiSelfieSubmitter<T: SelfieTransport> {
    transport: Arc<T>,
}

impl<T: SelfieTransport> ApiSelfieSubmitter<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: SelfieTransport> SelfieSubmitter for ApiSelfieSubmitter<T> {
    async fn submit(
        &self,
        exam_id: &ExamId,
        candidate: &VerifiedCandidate,
        image: &CapturedImage,
    ) -> SelfieOutcome {
        if let Err(e) = self
            .transport
            .record_proof(&exam_id.0, &candidate.user_id.0, &candidate.tag.0)
            .await
        {
            warn!("Check-in proof for {} failed: {}", candidate.email, e);
            return match e {
                ApiError::Unauthorized => SelfieOutcome::SessionExpired,
                e => SelfieOutcome::Failed(FailureCause::from_api(e)),
            };
        }

        match self
            .transport
            .store_image(&exam_id.0, &candidate.user_id.0, image)
            .await
        {
            Ok(image_url) => SelfieOutcome::Accepted {
                image_url: Some(image_url),
            },
            Err(ApiError::Unauthorized) => SelfieOutcome::SessionExpired,
            Err(e) => {
                warn!("Selfie upload for {} failed: {}", candidate.email, e);
                SelfieOutcome::Failed(FailureCause::from_api(e))
            }
        }
    }
}
