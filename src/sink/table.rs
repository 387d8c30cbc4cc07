use crate::sink::SinkError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

pub const TRADES_TABLE: &str = "backtest_trades";
pub const DAILY_TABLE: &str = "backtest_daily";

fn identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// `<dataset>.<table>` address in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    dataset: String,
    table: String,
}

impl TableName {
    pub fn new(dataset: &str, table: &str) -> Result<Self, SinkError> {
        for part in [dataset, table] {
            if !identifier().is_match(part) {
                return Err(SinkError::InvalidTableName(format!("{dataset}.{table}")));
            }
        }
        Ok(Self {
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }

    /// `<dataset>.<logical_name>_<job id>_<YYYYMMDDHHMMSS>`; the job id keeps
    /// jobs submitted within the same second apart.
    pub fn stamped(
        dataset: &str,
        logical_name: &str,
        job_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Self, SinkError> {
        let table = format!(
            "{}_{}_{}",
            logical_name,
            job_id.simple(),
            at.format("%Y%m%d%H%M%S")
        );
        Self::new(dataset, &table)
    }

    pub fn parse(s: &str) -> Result<Self, SinkError> {
        match s.split_once('.') {
            Some((dataset, table)) => Self::new(dataset, table),
            None => Err(SinkError::InvalidTableName(s.to_string())),
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}
