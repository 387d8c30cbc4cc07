use crate::sink::{ResultSink, RowSet, SinkError, TableName};
use async_trait::async_trait;
use log::info;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

/// Streams rows to an HTTP warehouse using an `insertAll`-style endpoint:
/// POST `{base_url}/datasets/{ds}/tables/{t}/insertAll`.
#[derive(Clone)]
pub struct RestWarehouseSink {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestWarehouseSink {
    pub fn new(base_url: String, token: Option<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn endpoint(&self, table: &TableName) -> String {
        format!(
            "{}/datasets/{}/tables/{}/insertAll",
            self.base_url.trim_end_matches('/'),
            table.dataset(),
            table.table()
        )
    }

    pub fn request_body(rows: &RowSet) -> Value {
        let rows: Vec<Value> = rows
            .to_objects()
            .into_iter()
            .map(|obj| json!({ "json": obj }))
            .collect();
        json!({ "rows": rows })
    }
}

#[async_trait]
impl ResultSink for RestWarehouseSink {
    async fn upload(&self, table: &TableName, rows: &RowSet) -> Result<(), SinkError> {
        let url = self.endpoint(table);
        let mut req = self.client.post(url.clone()).json(&Self::request_body(rows));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SinkError::Http(e.to_string()))?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| SinkError::Http(e.to_string()))?;
        check_response(status, raw)?;

        info!("✓ uploaded {} rows to {} [{}]", rows.len(), table, url);
        Ok(())
    }
}

/// Maps a warehouse reply to success or `Rejected`. A 200 can still carry
/// per-row failures in `insertErrors`.
pub fn check_response(status: StatusCode, raw: String) -> Result<(), SinkError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SinkError::Rejected {
            status: status.as_u16(),
            body: "unauthorized".to_string(),
        });
    }
    if !status.is_success() {
        return Err(SinkError::Rejected {
            status: status.as_u16(),
            body: raw,
        });
    }

    let has_row_errors = serde_json::from_str::<Value>(&raw)
        .ok()
        .and_then(|v| v.get("insertErrors").and_then(|e| e.as_array()).map(|e| !e.is_empty()))
        .unwrap_or(false);
    if has_row_errors {
        return Err(SinkError::Rejected {
            status: status.as_u16(),
            body: raw,
        });
    }
    Ok(())
}
