//! Local history of completed check-ins.
//!
//! The desk keeps its own record of who it checked in, independent of the
//! server. History writes are best-effort; the check-in itself never fails
//! because the local store does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod memory;
mod sqlite;

pub use memory::InMemoryHistory;
pub use sqlite::SqliteHistory;

/// Errors from the history store.
#[derive(Debug)]
pub enum HistoryError {
    Storage { operation: String, details: String },
}

impl HistoryError {
    pub fn storage(operation: impl Into<String>, details: impl std::fmt::Display) -> Self {
        HistoryError::Storage {
            operation: operation.into(),
            details: details.to_string(),
        }
    }
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::Storage { operation, details } => {
                write!(f, "history storage failed ({}): {}", operation, details)
            }
        }
    }
}

impl std::error::Error for HistoryError {}

/// One completed check-in.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInRecord {
    pub exam_id: String,
    pub user_id: String,
    pub email: String,
    pub seat: Option<String>,
    pub tag_serial: String,
    pub image_url: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Store of completed check-ins.
#[async_trait]
pub trait CheckInHistory: Send + Sync {
    /// Append a completed check-in.
    async fn record(&self, record: CheckInRecord) -> Result<(), HistoryError>;

    /// Most recent check-ins across all exams, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<CheckInRecord>, HistoryError>;

    /// Check-ins for one exam, newest first.
    async fn for_exam(&self, exam_id: &str) -> Result<Vec<CheckInRecord>, HistoryError>;
}
