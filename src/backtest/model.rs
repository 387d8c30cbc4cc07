use crate::backtest::engine::EngineError;
use crate::backtest::statistics::ReductionError;
use crate::sink::SinkError;
use crate::storage::StoreError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_INITIAL_PORTFOLIO_VALUE: f64 = 1_000_000.0;
pub const DEFAULT_SPREAD: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    PercentUnder,
    DesiredPremium,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::PercentUnder => "percent_under",
            StrategyKind::DesiredPremium => "desired_premium",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percent_under" => Ok(StrategyKind::PercentUnder),
            "desired_premium" => Ok(StrategyKind::DesiredPremium),
            other => Err(format!("unknown strategy kind: {other}")),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job row. `running` moves to exactly one terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_initial_portfolio_value() -> f64 {
    DEFAULT_INITIAL_PORTFOLIO_VALUE
}

fn default_spread() -> i32 {
    DEFAULT_SPREAD
}

/// Parameters handed over by the dispatch layer for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    pub job_id: Uuid,
    /// Handle of the dispatch system; falls back to the job id when absent.
    #[serde(default)]
    pub task_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(alias = "strategy")]
    pub strategy_kind: StrategyKind,
    #[serde(default = "default_initial_portfolio_value")]
    pub initial_portfolio_value: f64,
    #[serde(default = "default_spread")]
    pub spread: i32,
    #[serde(default)]
    pub strategy_unit: Option<f64>,
    #[serde(default)]
    pub testing: bool,
}

impl JobParams {
    pub fn new(
        job_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        strategy_kind: StrategyKind,
    ) -> Self {
        Self {
            job_id,
            task_id: None,
            start_date,
            end_date,
            strategy_kind,
            initial_portfolio_value: DEFAULT_INITIAL_PORTFOLIO_VALUE,
            spread: DEFAULT_SPREAD,
            strategy_unit: None,
            testing: false,
        }
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.end_date < self.start_date {
            return Err(JobError::InvalidParams(format!(
                "end_date {} is before start_date {}",
                self.end_date, self.start_date
            )));
        }
        if !self.initial_portfolio_value.is_finite() || self.initial_portfolio_value <= 0.0 {
            return Err(JobError::InvalidParams(format!(
                "initial_portfolio_value must be positive, got {}",
                self.initial_portfolio_value
            )));
        }
        if let Some(unit) = self.strategy_unit {
            if !unit.is_finite() {
                return Err(JobError::InvalidParams(format!(
                    "strategy_unit must be finite, got {unit}"
                )));
            }
        }
        Ok(())
    }

    pub fn task_handle(&self) -> String {
        self.task_id
            .clone()
            .unwrap_or_else(|| self.job_id.to_string())
    }
}

/// One trade produced by the simulation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub current_date: NaiveDate,
    pub profit_loss: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contracts: Option<i64>,
}

impl TradeRecord {
    pub fn new(current_date: NaiveDate, profit_loss: f64) -> Self {
        Self {
            current_date,
            profit_loss,
            symbol: None,
            strike: None,
            premium: None,
            contracts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub daily_return: f64,
    pub cumulative_portfolio_value: f64,
    pub daily_return_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_return: f64,
    pub total_return_percentage: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub std_deviation: f64,
    pub positive_periods: i32,
    pub negative_periods: i32,
    pub average_daily_return: f64,
}

/// Job metadata row as seen by the rest of the crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestJob {
    pub id: Uuid,
    pub task_id: String,
    pub submitted_at: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub spread: i32,
    pub initial_portfolio_value: f64,
    pub strategy: StrategyKind,
    pub strategy_unit: Option<f64>,
    pub status: JobStatus,
    pub bigquery_table: Option<String>,
    pub daily_table: Option<String>,
}

impl BacktestJob {
    pub fn running(params: &JobParams, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: params.job_id,
            task_id: params.task_handle(),
            submitted_at,
            start_date: params.start_date,
            end_date: params.end_date,
            spread: params.spread,
            initial_portfolio_value: params.initial_portfolio_value,
            strategy: params.strategy_kind,
            strategy_unit: params.strategy_unit,
            status: JobStatus::Running,
            bigquery_table: None,
            daily_table: None,
        }
    }
}

/// Warehouse locations written for a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRefs {
    pub trades: String,
    pub daily: String,
}

/// Value handed back to the dispatch layer when a job succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub persisted: bool,
    pub statistics: SummaryStatistics,
    pub downside_deviation: f64,
    pub days: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trades_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_table: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("invalid job parameters: {0}")]
    InvalidParams(String),
    #[error("simulation engine failed: {0}")]
    UpstreamEngine(#[from] EngineError),
    #[error("statistics reduction failed: {0}")]
    Reduction(#[from] ReductionError),
    #[error("result upload failed: {0}")]
    Sink(#[from] SinkError),
    #[error("record store failed: {0}")]
    Store(#[from] StoreError),
}

impl JobError {
    /// Short label used in logs and the worker's exit report.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InvalidParams(_) => "INVALID_PARAMS",
            JobError::UpstreamEngine(_) => "UPSTREAM_ENGINE",
            JobError::Reduction(_) => "REDUCTION",
            JobError::Sink(_) => "SINK",
            JobError::Store(_) => "STORE",
        }
    }
}
