//! Audit trail for grading attempts.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

/// One recorded grading attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub assignment_id: String,
    pub learner_id: String,
    pub pass: bool,
    pub submitted_raw: Value,
}

/// Where grading attempts are written. Implementations live outside the
/// engine; [`MemoryResultStore`] is the in-process one.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn record(&self, record: GradingRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryResultStore {
    records: Mutex<Vec<GradingRecord>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<GradingRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn record(&self, record: GradingRecord) -> Result<(), StoreError> {
        self.records.lock().push(record);
        Ok(())
    }
}
