use crate::backtest::model::{BacktestJob, JobStatus, SummaryStatistics, TableRefs};
use async_trait::async_trait;
use sea_orm::DbErr;
use serde::Serialize;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("job {0} already exists")]
    DuplicateJob(Uuid),
    #[error("job {0} not found")]
    NotFound(Uuid),
    #[error("job {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },
    #[error("corrupt row for job {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// A job row together with its statistics, if it completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub job: BacktestJob,
    pub statistics: Option<SummaryStatistics>,
}

/// Lifecycle persistence for backtest jobs.
///
/// A job is inserted `running` and leaves that state exactly once:
/// `mark_completed` writes the table refs, the status and the statistics row
/// in one transaction; `mark_error` only flips the status and is a no-op for a
/// job that is already terminal.
#[async_trait]
pub trait BacktestRecordStore: Send + Sync {
    async fn create_running(&self, job: &BacktestJob) -> Result<(), StoreError>;

    async fn mark_completed(
        &self,
        job_id: Uuid,
        tables: &TableRefs,
        summary: &SummaryStatistics,
    ) -> Result<(), StoreError>;

    async fn mark_error(&self, job_id: Uuid) -> Result<(), StoreError>;

    async fn find_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, StoreError>;
}
