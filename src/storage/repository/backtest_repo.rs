use crate::backtest::model::{BacktestJob, JobStatus, StrategyKind, SummaryStatistics, TableRefs};
use crate::storage::entity::backtest::{self, ActiveModel as BacktestActiveModel, Entity as Backtest};
use crate::storage::entity::statistics::{
    self, ActiveModel as StatisticsActiveModel, Entity as Statistics,
};
use crate::storage::store::{BacktestRecordStore, JobRecord, StoreError};
use async_trait::async_trait;
use log::{debug, info};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// sea-orm backed record store.
#[derive(Clone)]
pub struct BacktestRepository {
    db: Arc<DatabaseConnection>,
}

impl BacktestRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Explains why a conditional `running -> *` update touched no row.
    async fn not_running<C>(conn: &C, job_id: Uuid) -> Result<StoreError, StoreError>
    where
        C: ConnectionTrait + Sync,
    {
        match Backtest::find_by_id(job_id).one(conn).await? {
            None => Ok(StoreError::NotFound(job_id)),
            Some(row) => Ok(StoreError::AlreadyTerminal {
                id: job_id,
                status: parse_status(&row)?,
            }),
        }
    }
}

#[async_trait]
impl BacktestRecordStore for BacktestRepository {
    async fn create_running(&self, job: &BacktestJob) -> Result<(), StoreError> {
        if Backtest::find_by_id(job.id).one(self.db.as_ref()).await?.is_some() {
            return Err(StoreError::DuplicateJob(job.id));
        }

        let active_model = BacktestActiveModel {
            id: Set(job.id),
            task_id: Set(job.task_id.clone()),
            submitted_at: Set(job.submitted_at),
            start_date: Set(job.start_date),
            end_date: Set(job.end_date),
            spread: Set(job.spread),
            initial_portfolio_value: Set(job.initial_portfolio_value),
            strategy: Set(job.strategy.as_str().to_string()),
            strategy_unit: Set(job.strategy_unit),
            status: Set(JobStatus::Running.as_str().to_string()),
            bigquery_table: Set(None),
            daily_table: Set(None),
        };

        match Backtest::insert(active_model).exec(self.db.as_ref()).await {
            Ok(_) => {}
            // lost a race against a concurrent delivery of the same id
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(StoreError::DuplicateJob(job.id));
            }
            Err(e) => return Err(e.into()),
        }

        info!("job [{}] recorded as running (task {})", job.id, job.task_id);
        Ok(())
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        tables: &TableRefs,
        summary: &SummaryStatistics,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        let res = Backtest::update_many()
            .col_expr(
                backtest::Column::Status,
                Expr::value(JobStatus::Completed.as_str()),
            )
            .col_expr(
                backtest::Column::BigqueryTable,
                Expr::value(tables.trades.clone()),
            )
            .col_expr(
                backtest::Column::DailyTable,
                Expr::value(tables.daily.clone()),
            )
            .filter(backtest::Column::Id.eq(job_id))
            .filter(backtest::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(&txn)
            .await?;

        if res.rows_affected == 0 {
            let err = Self::not_running(&txn, job_id).await?;
            txn.rollback().await?;
            return Err(err);
        }

        let stats = StatisticsActiveModel {
            id: Set(Uuid::new_v4()),
            backtest_id: Set(job_id),
            total_return_percentage: Set(summary.total_return_percentage),
            total_return: Set(summary.total_return),
            max_drawdown_percent: Set(summary.max_drawdown_percent),
            max_drawdown: Set(summary.max_drawdown),
            std_deviation: Set(summary.std_deviation),
            positive_periods: Set(summary.positive_periods),
            negative_periods: Set(summary.negative_periods),
            average_daily_return: Set(summary.average_daily_return),
        };
        if let Err(e) = Statistics::insert(stats).exec(&txn).await {
            txn.rollback().await?;
            return Err(e.into());
        }

        txn.commit().await?;
        info!("✓ job [{}] completed -> {}", job_id, tables.trades);
        Ok(())
    }

    async fn mark_error(&self, job_id: Uuid) -> Result<(), StoreError> {
        let res = Backtest::update_many()
            .col_expr(
                backtest::Column::Status,
                Expr::value(JobStatus::Error.as_str()),
            )
            .filter(backtest::Column::Id.eq(job_id))
            .filter(backtest::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(self.db.as_ref())
            .await?;

        if res.rows_affected == 0 {
            return match Self::not_running(self.db.as_ref(), job_id).await? {
                StoreError::AlreadyTerminal { status, .. } => {
                    debug!("job [{}] already {}, leaving it", job_id, status);
                    Ok(())
                }
                other => Err(other),
            };
        }

        info!("✗ job [{}] marked error", job_id);
        Ok(())
    }

    async fn find_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        let found = Backtest::find_by_id(job_id)
            .find_also_related(Statistics)
            .one(self.db.as_ref())
            .await?;

        let Some((row, stats)) = found else {
            return Ok(None);
        };
        Ok(Some(JobRecord {
            job: to_job(row)?,
            statistics: stats.map(SummaryStatistics::from),
        }))
    }
}

fn parse_status(row: &backtest::Model) -> Result<JobStatus, StoreError> {
    row.status.parse::<JobStatus>().map_err(|reason| StoreError::Corrupt {
        id: row.id,
        reason,
    })
}

fn to_job(row: backtest::Model) -> Result<BacktestJob, StoreError> {
    let status = parse_status(&row)?;
    let strategy = row.strategy.parse::<StrategyKind>().map_err(|reason| StoreError::Corrupt {
        id: row.id,
        reason,
    })?;
    Ok(BacktestJob {
        id: row.id,
        task_id: row.task_id,
        submitted_at: row.submitted_at,
        start_date: row.start_date,
        end_date: row.end_date,
        spread: row.spread,
        initial_portfolio_value: row.initial_portfolio_value,
        strategy,
        strategy_unit: row.strategy_unit,
        status,
        bigquery_table: row.bigquery_table,
        daily_table: row.daily_table,
    })
}

impl From<statistics::Model> for SummaryStatistics {
    fn from(m: statistics::Model) -> Self {
        Self {
            total_return: m.total_return,
            total_return_percentage: m.total_return_percentage,
            max_drawdown: m.max_drawdown,
            max_drawdown_percent: m.max_drawdown_percent,
            std_deviation: m.std_deviation,
            positive_periods: m.positive_periods,
            negative_periods: m.negative_periods,
            average_daily_return: m.average_daily_return,
        }
    }
}
