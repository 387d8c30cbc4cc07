mod common;

use common::{
    day, memory_repo, params, scenario_trades, CountingStore, RecordingSink, StubEngine,
};
use rustbt::backtest::model::{JobStatus, TradeRecord};
use rustbt::backtest::{JobError, JobOrchestrator};
use rustbt::sink::{CsvWarehouseSink, TableName};
use rustbt::storage::{BacktestRecordStore, StoreError};
use std::sync::Arc;
use uuid::Uuid;

const DATASET: &str = "bt";

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn orchestrator(
    engine: Arc<StubEngine>,
    sink: Arc<RecordingSink>,
    store: Arc<CountingStore>,
) -> JobOrchestrator {
    JobOrchestrator::new(engine, sink, store, DATASET)
}

#[tokio::test]
async fn completed_job_uploads_both_tables_and_records_statistics() {
    let engine = StubEngine::returning(scenario_trades());
    let sink = RecordingSink::new();
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = orchestrator(engine.clone(), sink.clone(), store.clone());
    let id = Uuid::new_v4();

    let outcome = orch.run(params(id)).await.unwrap();

    assert!(outcome.persisted);
    assert_eq!(outcome.job_id, id);
    assert_eq!(outcome.days, 3);
    assert!(close(outcome.statistics.total_return, 700.0));
    assert!(close(outcome.statistics.total_return_percentage, 0.7));
    assert!(close(outcome.statistics.max_drawdown, 500.0));
    assert!(close(outcome.statistics.max_drawdown_percent, 0.5));
    assert_eq!(engine.calls(), 1);

    let mut tables = sink.tables();
    tables.sort();
    assert_eq!(tables.len(), 2);
    let job_tag = id.simple().to_string();
    assert!(tables[0].starts_with(&format!("bt.backtest_daily_{job_tag}_")));
    assert!(tables[1].starts_with(&format!("bt.backtest_trades_{job_tag}_")));
    assert_eq!(sink.rows_for("backtest_trades").unwrap().len(), 3);
    assert_eq!(sink.rows_for("backtest_daily").unwrap().len(), 3);

    let trades_table = outcome.trades_table.clone().unwrap();
    assert!(tables.contains(&trades_table));
    assert!(tables.contains(outcome.daily_table.as_ref().unwrap()));

    let record = store.find_job(id).await.unwrap().unwrap();
    assert_eq!(record.job.status, JobStatus::Completed);
    assert_eq!(record.job.bigquery_table, Some(trades_table));
    assert_eq!(record.statistics, Some(outcome.statistics.clone()));
    assert_eq!(store.error_calls(), 0);
}

#[tokio::test]
async fn testing_mode_never_touches_store_or_sink() {
    let engine = StubEngine::returning(scenario_trades());
    let sink = RecordingSink::new();
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = orchestrator(engine.clone(), sink.clone(), store.clone());
    let id = Uuid::new_v4();
    let mut p = params(id);
    p.testing = true;

    let outcome = orch.run(p).await.unwrap();

    assert!(!outcome.persisted);
    assert!(outcome.trades_table.is_none());
    assert!(close(outcome.statistics.total_return, 700.0));
    assert_eq!(engine.calls(), 1);
    assert!(sink.tables().is_empty());
    assert_eq!(store.total_calls(), 0);
    assert!(store.find_job(id).await.unwrap().is_none());
}

#[tokio::test]
async fn engine_failure_marks_job_error_once() {
    let engine = StubEngine::failing("simulator crashed");
    let sink = RecordingSink::new();
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = orchestrator(engine, sink.clone(), store.clone());
    let id = Uuid::new_v4();

    let err = orch.run(params(id)).await.unwrap_err();

    assert!(matches!(err, JobError::UpstreamEngine(_)));
    assert_eq!(err.kind(), "UPSTREAM_ENGINE");
    assert_eq!(store.error_calls(), 1);
    assert!(sink.tables().is_empty());

    let record = store.find_job(id).await.unwrap().unwrap();
    assert_eq!(record.job.status, JobStatus::Error);
    assert!(record.statistics.is_none());
}

#[tokio::test]
async fn non_finite_profit_fails_reduction() {
    let mut trades = scenario_trades();
    trades.push(TradeRecord::new(day(2024, 1, 3), f64::NAN));
    let engine = StubEngine::returning(trades);
    let sink = RecordingSink::new();
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = orchestrator(engine, sink.clone(), store.clone());
    let id = Uuid::new_v4();

    let err = orch.run(params(id)).await.unwrap_err();

    assert!(matches!(err, JobError::Reduction(_)));
    assert!(sink.tables().is_empty());
    assert_eq!(store.error_calls(), 1);
    let record = store.find_job(id).await.unwrap().unwrap();
    assert_eq!(record.job.status, JobStatus::Error);
}

#[tokio::test]
async fn sink_failure_marks_job_error() {
    let engine = StubEngine::returning(scenario_trades());
    let sink = RecordingSink::failing_on("backtest_trades");
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = orchestrator(engine, sink, store.clone());
    let id = Uuid::new_v4();

    let err = orch.run(params(id)).await.unwrap_err();

    assert!(matches!(err, JobError::Sink(_)));
    assert_eq!(store.error_calls(), 1);
    let record = store.find_job(id).await.unwrap().unwrap();
    assert_eq!(record.job.status, JobStatus::Error);
    assert!(record.job.bigquery_table.is_none());
    assert!(record.statistics.is_none());
}

#[tokio::test]
async fn failed_commit_after_upload_leaves_tables_but_no_statistics() {
    let engine = StubEngine::returning(scenario_trades());
    let sink = RecordingSink::new();
    let mut counting = CountingStore::new(memory_repo().await);
    counting.fail_complete = true;
    let store = Arc::new(counting);
    let orch = orchestrator(engine, sink.clone(), store.clone());
    let id = Uuid::new_v4();

    let err = orch.run(params(id)).await.unwrap_err();

    assert!(matches!(err, JobError::Store(StoreError::Db(_))));
    // the warehouse tables stay behind as orphans
    assert_eq!(sink.tables().len(), 2);
    assert_eq!(store.error_calls(), 1);
    let record = store.find_job(id).await.unwrap().unwrap();
    assert_eq!(record.job.status, JobStatus::Error);
    assert!(record.job.bigquery_table.is_none());
    assert!(record.statistics.is_none());
}

#[tokio::test]
async fn redelivered_job_is_rejected_without_touching_the_first_run() {
    let engine = StubEngine::returning(scenario_trades());
    let sink = RecordingSink::new();
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = orchestrator(engine.clone(), sink.clone(), store.clone());
    let id = Uuid::new_v4();

    orch.run(params(id)).await.unwrap();
    let err = orch.run(params(id)).await.unwrap_err();

    assert!(matches!(err, JobError::Store(StoreError::DuplicateJob(dup)) if dup == id));
    assert_eq!(engine.calls(), 1);
    assert_eq!(sink.tables().len(), 2);
    assert_eq!(store.error_calls(), 0);
    let record = store.find_job(id).await.unwrap().unwrap();
    assert_eq!(record.job.status, JobStatus::Completed);
    assert!(record.statistics.is_some());
}

#[tokio::test]
async fn failed_initialization_skips_compute_and_error_marking() {
    let engine = StubEngine::returning(scenario_trades());
    let sink = RecordingSink::new();
    let mut counting = CountingStore::new(memory_repo().await);
    counting.fail_create = true;
    let store = Arc::new(counting);
    let orch = orchestrator(engine.clone(), sink.clone(), store.clone());

    let err = orch.run(params(Uuid::new_v4())).await.unwrap_err();

    assert!(matches!(err, JobError::Store(StoreError::Db(_))));
    assert_eq!(engine.calls(), 0);
    assert!(sink.tables().is_empty());
    assert_eq!(store.error_calls(), 0);
}

#[tokio::test]
async fn invalid_params_are_rejected_before_any_side_effect() {
    let engine = StubEngine::returning(scenario_trades());
    let sink = RecordingSink::new();
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = orchestrator(engine.clone(), sink.clone(), store.clone());
    let mut p = params(Uuid::new_v4());
    p.end_date = day(2023, 12, 31);

    let err = orch.run(p).await.unwrap_err();

    assert!(matches!(err, JobError::InvalidParams(_)));
    assert_eq!(engine.calls(), 0);
    assert_eq!(store.total_calls(), 0);
    assert!(sink.tables().is_empty());
}

#[tokio::test]
async fn empty_simulation_completes_with_zero_statistics() {
    let engine = StubEngine::returning(Vec::new());
    let sink = RecordingSink::new();
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = orchestrator(engine, sink.clone(), store.clone());
    let id = Uuid::new_v4();

    let outcome = orch.run(params(id)).await.unwrap();

    assert_eq!(outcome.days, 0);
    assert_eq!(outcome.statistics.total_return, 0.0);
    assert_eq!(outcome.statistics.std_deviation, 0.0);
    assert_eq!(sink.tables().len(), 2);
    assert!(sink.rows_for("backtest_trades").unwrap().is_empty());
    let record = store.find_job(id).await.unwrap().unwrap();
    assert_eq!(record.job.status, JobStatus::Completed);
}

#[tokio::test]
async fn concurrent_jobs_keep_separate_rows() {
    let engine = StubEngine::returning(scenario_trades());
    let sink = RecordingSink::new();
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = Arc::new(orchestrator(engine.clone(), sink.clone(), store.clone()));
    let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

    let handles: Vec<_> = ids
        .iter()
        .map(|id| {
            let orch = orch.clone();
            let p = params(*id);
            tokio::spawn(async move { orch.run(p).await })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(engine.calls(), 4);
    let mut trade_tables = Vec::new();
    for id in &ids {
        let record = store.find_job(*id).await.unwrap().unwrap();
        assert_eq!(record.job.status, JobStatus::Completed);
        assert!(close(record.statistics.unwrap().total_return, 700.0));
        trade_tables.push(record.job.bigquery_table.unwrap());
    }

    let mut distinct = trade_tables.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), ids.len());

    let uploads = sink.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 2 * ids.len());
    for table in &trade_tables {
        let matching: Vec<_> = uploads.iter().filter(|(t, _)| t == table).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].1.len(), 3);
    }
}

#[tokio::test]
async fn jobs_sharing_a_csv_warehouse_write_separate_tables() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = CsvWarehouseSink::new(dir.path());
    let engine = StubEngine::returning(scenario_trades());
    let store = Arc::new(CountingStore::new(memory_repo().await));
    let orch = JobOrchestrator::new(engine, Arc::new(warehouse.clone()), store.clone(), DATASET);

    let first = orch.run(params(Uuid::new_v4())).await.unwrap();
    let second = orch.run(params(Uuid::new_v4())).await.unwrap();

    let first_table = first.trades_table.unwrap();
    let second_table = second.trades_table.unwrap();
    assert_ne!(first_table, second_table);
    assert_ne!(first.daily_table, second.daily_table);

    for table in [first_table, second_table] {
        let path = warehouse.table_path(&TableName::parse(&table).unwrap());
        let content = std::fs::read_to_string(path).unwrap();
        // header plus this job's three trades
        assert_eq!(content.lines().count(), 4);
    }
}

#[tokio::test]
async fn failed_error_marking_still_returns_the_job_error() {
    let engine = StubEngine::failing("simulator crashed");
    let sink = RecordingSink::new();
    let mut counting = CountingStore::new(memory_repo().await);
    counting.fail_error = true;
    let store = Arc::new(counting);
    let orch = orchestrator(engine, sink.clone(), store.clone());
    let id = Uuid::new_v4();

    let err = orch.run(params(id)).await.unwrap_err();

    assert!(matches!(err, JobError::UpstreamEngine(_)));
    assert_eq!(store.error_calls(), 1);
    let record = store.find_job(id).await.unwrap().unwrap();
    assert_eq!(record.job.status, JobStatus::Running);
    assert!(record.statistics.is_none());
}

#[tokio::test]
async fn preview_needs_only_an_engine() {
    let engine = StubEngine::returning(scenario_trades());
    let mut p = params(Uuid::new_v4());
    p.testing = true;

    let outcome = JobOrchestrator::preview(engine.as_ref(), p).await.unwrap();

    assert!(!outcome.persisted);
    assert!(outcome.daily_table.is_none());
    assert_eq!(outcome.days, 3);
    assert!(close(outcome.statistics.max_drawdown, 500.0));
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn preview_validates_params() {
    let engine = StubEngine::returning(scenario_trades());
    let mut p = params(Uuid::new_v4());
    p.initial_portfolio_value = -1.0;

    let err = JobOrchestrator::preview(engine.as_ref(), p).await.unwrap_err();

    assert!(matches!(err, JobError::InvalidParams(_)));
    assert_eq!(engine.calls(), 0);
}
