#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use rustbt::backtest::model::{BacktestJob, SummaryStatistics, TableRefs, TradeRecord};
use rustbt::backtest::{EngineError, JobParams, SimulationEngine, SimulationRequest, StrategyKind};
use rustbt::sink::{ResultSink, RowSet, SinkError, TableName};
use rustbt::storage::{self, BacktestRecordStore, BacktestRepository, JobRecord, StoreError};
use sea_orm::DbErr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn memory_repo() -> BacktestRepository {
    let db = storage::establish_connection("sqlite::memory:", 1)
        .await
        .expect("in-memory sqlite");
    BacktestRepository::new(Arc::new(db))
}

pub fn params(job_id: Uuid) -> JobParams {
    let mut p = JobParams::new(
        job_id,
        day(2024, 1, 1),
        day(2024, 1, 3),
        StrategyKind::PercentUnder,
    );
    p.initial_portfolio_value = 100_000.0;
    p
}

pub fn scenario_trades() -> Vec<TradeRecord> {
    vec![
        TradeRecord::new(day(2024, 1, 1), 1000.0),
        TradeRecord::new(day(2024, 1, 2), -500.0),
        TradeRecord::new(day(2024, 1, 3), 200.0),
    ]
}

pub enum EngineBehavior {
    Trades(Vec<TradeRecord>),
    Fail(String),
}

pub struct StubEngine {
    behavior: EngineBehavior,
    pub calls: AtomicUsize,
}

impl StubEngine {
    pub fn returning(trades: Vec<TradeRecord>) -> Arc<Self> {
        Arc::new(Self {
            behavior: EngineBehavior::Trades(trades),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self {
            behavior: EngineBehavior::Fail(msg.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimulationEngine for StubEngine {
    async fn simulate(&self, _req: &SimulationRequest) -> Result<Vec<TradeRecord>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            EngineBehavior::Trades(t) => Ok(t.clone()),
            EngineBehavior::Fail(msg) => Err(EngineError::Failed(msg.clone())),
        }
    }
}

/// Remembers every upload; optionally fails tables whose name contains `fail_on`.
#[derive(Default)]
pub struct RecordingSink {
    pub uploads: Mutex<Vec<(String, RowSet)>>,
    fail_on: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(fragment: &str) -> Arc<Self> {
        Arc::new(Self {
            uploads: Mutex::new(Vec::new()),
            fail_on: Some(fragment.to_string()),
        })
    }

    pub fn tables(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn rows_for(&self, fragment: &str) -> Option<RowSet> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| t.contains(fragment))
            .map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn upload(&self, table: &TableName, rows: &RowSet) -> Result<(), SinkError> {
        let name = table.to_string();
        if let Some(fragment) = &self.fail_on {
            if name.contains(fragment.as_str()) {
                return Err(SinkError::Rejected {
                    status: 503,
                    body: "warehouse unavailable".to_string(),
                });
            }
        }
        self.uploads.lock().unwrap().push((name, rows.clone()));
        Ok(())
    }
}

/// Counts calls per operation and delegates to a real repository. The
/// `fail_*` switches turn the matching operation into a store failure.
pub struct CountingStore {
    pub inner: BacktestRepository,
    pub creates: AtomicUsize,
    pub completions: AtomicUsize,
    pub errors: AtomicUsize,
    pub fail_create: bool,
    pub fail_complete: bool,
    pub fail_error: bool,
}

impl CountingStore {
    pub fn new(inner: BacktestRepository) -> Self {
        Self {
            inner,
            creates: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            fail_create: false,
            fail_complete: false,
            fail_error: false,
        }
    }

    pub fn total_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.completions.load(Ordering::SeqCst)
            + self.errors.load(Ordering::SeqCst)
    }

    pub fn error_calls(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BacktestRecordStore for CountingStore {
    async fn create_running(&self, job: &BacktestJob) -> Result<(), StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(StoreError::Db(DbErr::Conn(sea_orm::RuntimeErr::Internal(
                "connection refused".to_string(),
            ))));
        }
        self.inner.create_running(job).await
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        tables: &TableRefs,
        summary: &SummaryStatistics,
    ) -> Result<(), StoreError> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        if self.fail_complete {
            return Err(StoreError::Db(DbErr::Custom("commit failed".to_string())));
        }
        self.inner.mark_completed(job_id, tables, summary).await
    }

    async fn mark_error(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.errors.fetch_add(1, Ordering::SeqCst);
        if self.fail_error {
            return Err(StoreError::Db(DbErr::Custom("status update failed".to_string())));
        }
        self.inner.mark_error(job_id).await
    }

    async fn find_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        self.inner.find_job(job_id).await
    }
}
