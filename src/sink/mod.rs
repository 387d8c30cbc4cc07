pub mod csv_sink;
pub mod rest_sink;
pub mod table;
pub mod unified;

pub use csv_sink::CsvWarehouseSink;
pub use rest_sink::RestWarehouseSink;
pub use table::TableName;
pub use unified::AnySink;

use crate::backtest::model::{DailyAggregate, TradeRecord};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("invalid table name: {0}")]
    InvalidTableName(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("schema mismatch for {table}: existing [{existing}], incoming [{incoming}]")]
    SchemaMismatch {
        table: String,
        existing: String,
        incoming: String,
    },
    #[error("http error: {0}")]
    Http(String),
    #[error("upload rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Bulk storage for result tables. Uploading to an existing table appends.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn upload(&self, table: &TableName, rows: &RowSet) -> Result<(), SinkError>;
}

/// A row type with a fixed column layout.
pub trait TabularRecord {
    fn columns() -> Vec<&'static str>;
    fn values(&self) -> Vec<Value>;
}

/// Column names plus rows of scalar values, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn from_records<T: TabularRecord>(records: &[T]) -> Self {
        Self {
            columns: T::columns(),
            rows: records.iter().map(TabularRecord::values).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows keyed by column name.
    pub fn to_objects(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.to_string(), v.clone()))
                    .collect()
            })
            .collect()
    }
}

impl TabularRecord for TradeRecord {
    fn columns() -> Vec<&'static str> {
        vec![
            "current_date",
            "profit_loss",
            "symbol",
            "strike",
            "premium",
            "contracts",
        ]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            json!(self.current_date.format("%Y-%m-%d").to_string()),
            json!(self.profit_loss),
            json!(self.symbol),
            json!(self.strike),
            json!(self.premium),
            json!(self.contracts),
        ]
    }
}

impl TabularRecord for DailyAggregate {
    fn columns() -> Vec<&'static str> {
        vec![
            "current_date",
            "daily_return",
            "portfolio_value",
            "daily_return_percent",
        ]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            json!(self.date.format("%Y-%m-%d").to_string()),
            json!(self.daily_return),
            json!(self.cumulative_portfolio_value),
            json!(self.daily_return_percent),
        ]
    }
}
