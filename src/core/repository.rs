use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BatchError;

use super::step::StepStatus;

/// Persisted snapshot of a step execution.
///
/// `execution_context` is the opaque JSON blob produced by
/// [`ExecutionContext::to_json`](super::execution_context::ExecutionContext::to_json).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    pub id: Uuid,
    pub job_name: String,
    pub step_name: String,
    pub status: StepStatus,
    pub item_count: usize,
    pub commit_count: usize,
    pub skip_count: usize,
    pub failure: Option<String>,
    pub execution_context: String,
}

/// Storage of step execution metadata.
///
/// Called by the steps at start, at every commit and at the end of an
/// execution. Implementations must serialize concurrent writes for the same
/// execution id.
pub trait JobRepository: Send + Sync {
    /// Inserts the record, or replaces the one with the same `id`.
    fn save(&self, record: &StepExecutionRecord) -> Result<(), BatchError>;

    /// Most recently created execution of `step_name` within `job_name`.
    fn get_last_step_execution(
        &self,
        job_name: &str,
        step_name: &str,
    ) -> Result<Option<StepExecutionRecord>, BatchError>;
}

/// `JobRepository` keeping its records in memory.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    records: Mutex<Vec<StepExecutionRecord>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records of `step_name`, oldest first.
    pub fn step_executions(&self, job_name: &str, step_name: &str) -> Vec<StepExecutionRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.job_name == job_name && record.step_name == step_name)
            .cloned()
            .collect()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn save(&self, record: &StepExecutionRecord) -> Result<(), BatchError> {
        let mut records = self.records.lock();
        match records.iter_mut().find(|stored| stored.id == record.id) {
            Some(stored) => *stored = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    fn get_last_step_execution(
        &self,
        job_name: &str,
        step_name: &str,
    ) -> Result<Option<StepExecutionRecord>, BatchError> {
        Ok(self
            .records
            .lock()
            .iter()
            .rev()
            .find(|record| record.job_name == job_name && record.step_name == step_name)
            .cloned())
    }
}
