use crate::backtest::engine::{SimulationEngine, SimulationRequest};
use crate::backtest::model::{
    BacktestJob, DailyAggregate, JobError, JobOutcome, JobParams, SummaryStatistics, TableRefs,
    TradeRecord,
};
use crate::backtest::statistics::StatisticsEngine;
use crate::sink::table::{DAILY_TABLE, TRADES_TABLE};
use crate::sink::{ResultSink, RowSet, TableName};
use crate::storage::BacktestRecordStore;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Minimum acceptable return for the downside deviation in job results.
const DOWNSIDE_MAR: f64 = 0.0;

struct Computed {
    trades: Vec<TradeRecord>,
    daily: Vec<DailyAggregate>,
    summary: SummaryStatistics,
}

/// Runs one backtest job end to end.
///
/// `Initializing` records the job as running; a failure there returns before
/// any compute. `Running` simulates, reduces, uploads both tables and commits
/// the metadata. Any failure while running leads to a single `mark_error`
/// call and the original error is returned. Jobs with `testing` set skip the
/// store and the sink entirely.
pub struct JobOrchestrator {
    engine: Arc<dyn SimulationEngine>,
    sink: Arc<dyn ResultSink>,
    store: Arc<dyn BacktestRecordStore>,
    dataset: String,
}

impl JobOrchestrator {
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        sink: Arc<dyn ResultSink>,
        store: Arc<dyn BacktestRecordStore>,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            sink,
            store,
            dataset: dataset.into(),
        }
    }

    pub async fn run(&self, params: JobParams) -> Result<JobOutcome, JobError> {
        if params.testing {
            return Self::preview(self.engine.as_ref(), params).await;
        }

        params.validate()?;
        let job_id = params.job_id;
        let started_at = Utc::now();
        let req = simulation_request(&params);

        let job = BacktestJob::running(&params, started_at);
        if let Err(e) = self.store.create_running(&job).await {
            error!("job [{}] could not be recorded, aborting: {}", job_id, e);
            return Err(e.into());
        }
        info!(
            "🚀 job [{}] running: {} {}..{} spread={} initial={}",
            job_id,
            params.strategy_kind,
            params.start_date,
            params.end_date,
            params.spread,
            params.initial_portfolio_value
        );

        match self.execute(&params, &req, started_at).await {
            Ok(done) => {
                info!(
                    "✓ job [{}] completed: {} days, total return {:.2}",
                    job_id, done.days, done.statistics.total_return
                );
                Ok(done)
            }
            Err(err) => {
                warn!("✗ job [{}] failed ({}): {}", job_id, err.kind(), err);
                if let Err(mark_err) = self.store.mark_error(job_id).await {
                    error!("job [{}] could not be marked error: {}", job_id, mark_err);
                }
                Err(err)
            }
        }
    }

    /// Simulates and reduces a job without a store or a sink. Used for jobs
    /// with `testing` set, and by callers that have not opened a store.
    pub async fn preview(
        engine: &dyn SimulationEngine,
        params: JobParams,
    ) -> Result<JobOutcome, JobError> {
        params.validate()?;
        info!("🚀 job [{}] started in testing mode, results stay in memory", params.job_id);
        let computed = compute(engine, &params, &simulation_request(&params)).await?;
        Ok(outcome(&params, &computed, None))
    }

    async fn execute(
        &self,
        params: &JobParams,
        req: &SimulationRequest,
        started_at: DateTime<Utc>,
    ) -> Result<JobOutcome, JobError> {
        let computed = compute(self.engine.as_ref(), params, req).await?;
        let tables = self.upload(params.job_id, &computed, started_at).await?;
        // an upload that succeeded is orphaned if this commit fails
        self.store
            .mark_completed(params.job_id, &tables, &computed.summary)
            .await?;
        Ok(outcome(params, &computed, Some(tables)))
    }

    async fn upload(
        &self,
        job_id: Uuid,
        computed: &Computed,
        at: DateTime<Utc>,
    ) -> Result<TableRefs, JobError> {
        let trades_table = TableName::stamped(&self.dataset, TRADES_TABLE, job_id, at)?;
        let daily_table = TableName::stamped(&self.dataset, DAILY_TABLE, job_id, at)?;
        let trade_rows = RowSet::from_records(&computed.trades);
        let daily_rows = RowSet::from_records(&computed.daily);

        futures::try_join!(
            self.sink.upload(&daily_table, &daily_rows),
            self.sink.upload(&trades_table, &trade_rows),
        )?;

        Ok(TableRefs {
            trades: trades_table.to_string(),
            daily: daily_table.to_string(),
        })
    }
}

async fn compute(
    engine: &dyn SimulationEngine,
    params: &JobParams,
    req: &SimulationRequest,
) -> Result<Computed, JobError> {
    let trades = engine.simulate(req).await?;
    let (daily, summary) = StatisticsEngine::reduce(&trades, params.initial_portfolio_value)?;
    Ok(Computed {
        trades,
        daily,
        summary,
    })
}

fn simulation_request(params: &JobParams) -> SimulationRequest {
    SimulationRequest {
        start_date: params.start_date,
        end_date: params.end_date,
        strategy: params.strategy_kind,
        spread: params.spread,
        strategy_unit: params.strategy_unit,
        initial_portfolio_value: params.initial_portfolio_value,
    }
}

fn outcome(params: &JobParams, computed: &Computed, tables: Option<TableRefs>) -> JobOutcome {
    JobOutcome {
        job_id: params.job_id,
        start_date: params.start_date,
        end_date: params.end_date,
        persisted: tables.is_some(),
        statistics: computed.summary.clone(),
        downside_deviation: StatisticsEngine::downside_deviation(&computed.daily, DOWNSIDE_MAR),
        days: computed.daily.len(),
        trades_table: tables.as_ref().map(|t| t.trades.clone()),
        daily_table: tables.map(|t| t.daily),
    }
}
