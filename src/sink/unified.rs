use crate::config::{WarehouseConfig, WorkerConfig};
use crate::sink::{CsvWarehouseSink, RestWarehouseSink, ResultSink, RowSet, SinkError, TableName};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Clone)]
pub enum InnerSink {
    Csv(CsvWarehouseSink),
    Rest(RestWarehouseSink),
}

/// Warehouse picked by `WAREHOUSE_KIND` (`csv` by default, or `rest`).
#[derive(Clone)]
pub struct AnySink {
    inner: InnerSink,
}

impl AnySink {
    pub fn from_config(cfg: &WorkerConfig) -> Result<Self, SinkError> {
        let inner = match &cfg.warehouse {
            WarehouseConfig::Csv { dir } => InnerSink::Csv(CsvWarehouseSink::new(dir.clone())),
            WarehouseConfig::Rest {
                url,
                token,
                timeout_secs,
            } => InnerSink::Rest(RestWarehouseSink::new(
                url.clone(),
                token.clone(),
                Duration::from_secs(*timeout_secs),
            )?),
        };
        Ok(Self { inner })
    }

    pub fn kind(&self) -> &'static str {
        match self.inner {
            InnerSink::Csv(_) => "csv",
            InnerSink::Rest(_) => "rest",
        }
    }
}

impl From<CsvWarehouseSink> for AnySink {
    fn from(s: CsvWarehouseSink) -> Self {
        Self {
            inner: InnerSink::Csv(s),
        }
    }
}

impl From<RestWarehouseSink> for AnySink {
    fn from(s: RestWarehouseSink) -> Self {
        Self {
            inner: InnerSink::Rest(s),
        }
    }
}

#[async_trait]
impl ResultSink for AnySink {
    async fn upload(&self, table: &TableName, rows: &RowSet) -> Result<(), SinkError> {
        match &self.inner {
            InnerSink::Csv(s) => s.upload(table, rows).await,
            InnerSink::Rest(s) => s.upload(table, rows).await,
        }
    }
}
