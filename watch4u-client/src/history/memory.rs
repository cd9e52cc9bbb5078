//! In-memory history store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CheckInHistory, CheckInRecord, HistoryError};

/// History kept only for the lifetime of the process. Used in tests and
/// on desks running without a state directory.
#[derive(Default)]
pub struct InMemoryHistory {
    records: RwLock<Vec<CheckInRecord>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckInHistory for InMemoryHistory {
    async fn record(&self, record: CheckInRecord) -> Result<(), HistoryError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CheckInRecord>, HistoryError> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    async fn for_exam(&self, exam_id: &str) -> Result<Vec<CheckInRecord>, HistoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|record| record.exam_id == exam_id)
            .cloned()
            .collect())
    }
}
