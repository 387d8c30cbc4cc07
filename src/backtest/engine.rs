use crate::backtest::model::{StrategyKind, TradeRecord};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::info;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("http error: {0}")]
    Http(String),
    #[error("engine rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("engine returned no data")]
    NoData,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Failed(String),
}

/// Date window and strategy settings passed to the simulator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub strategy: StrategyKind,
    pub spread: i32,
    pub strategy_unit: Option<f64>,
    pub initial_portfolio_value: f64,
}

/// The trade simulator. Its math is opaque to this crate.
#[async_trait]
pub trait SimulationEngine: Send + Sync {
    async fn simulate(&self, req: &SimulationRequest) -> Result<Vec<TradeRecord>, EngineError>;
}

/// Calls a remote simulator service: POST `{base_url}/simulate` with the
/// request as JSON, expecting a JSON array of trades (or `{"trades": [...]}`).
#[derive(Clone)]
pub struct HttpSimulationEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSimulationEngine {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Http(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self) -> String {
        format!("{}/simulate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SimulationEngine for HttpSimulationEngine {
    async fn simulate(&self, req: &SimulationRequest) -> Result<Vec<TradeRecord>, EngineError> {
        let url = self.endpoint();
        let resp = self
            .client
            .post(url.clone())
            .json(req)
            .send()
            .await
            .map_err(|e| EngineError::Http(e.to_string()))?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| EngineError::Http(e.to_string()))?;

        if status == StatusCode::NO_CONTENT {
            return Err(EngineError::NoData);
        }
        if !status.is_success() {
            return Err(EngineError::Rejected {
                status: status.as_u16(),
                body: raw,
            });
        }

        let trades = decode_trades(&raw)?;
        info!(
            "simulator returned {} trades for {}..{} [{}]",
            trades.len(),
            req.start_date,
            req.end_date,
            url
        );
        Ok(trades)
    }
}

/// Accepts a bare array or an object with a `trades` array. A blank body or
/// `null` means the simulator produced nothing.
pub fn decode_trades(raw: &str) -> Result<Vec<TradeRecord>, EngineError> {
    if raw.trim().is_empty() {
        return Err(EngineError::NoData);
    }
    let v: Value = serde_json::from_str(raw)
        .map_err(|e| EngineError::InvalidResponse(format!("json parse failed: {e}")))?;

    let arr = match v {
        Value::Null => return Err(EngineError::NoData),
        Value::Array(items) => Value::Array(items),
        Value::Object(mut obj) => match obj.remove("trades") {
            Some(Value::Null) | None => return Err(EngineError::NoData),
            Some(t) => t,
        },
        _ => {
            return Err(EngineError::InvalidResponse(
                "expected an array of trades".to_string(),
            ))
        }
    };

    serde_json::from_value(arr)
        .map_err(|e| EngineError::InvalidResponse(format!("malformed trade row: {e}")))
}
