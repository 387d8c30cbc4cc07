use crate::sink::{ResultSink, RowSet, SinkError, TableName};
use async_trait::async_trait;
use log::info;
use serde_json::Value;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Directory-backed warehouse: table `ds.t` lives in `<root>/ds/t.csv`.
///
/// Writes through one sink (and its clones) are serialized so the header
/// check and the append happen as one step.
#[derive(Clone, Debug)]
pub struct CsvWarehouseSink {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl CsvWarehouseSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn table_path(&self, table: &TableName) -> PathBuf {
        self.root
            .join(table.dataset())
            .join(format!("{}.csv", table.table()))
    }
}

#[async_trait]
impl ResultSink for CsvWarehouseSink {
    async fn upload(&self, table: &TableName, rows: &RowSet) -> Result<(), SinkError> {
        let path = self.table_path(table);
        let name = table.to_string();
        let rows = rows.clone();
        let count = rows.len();
        let lock = Arc::clone(&self.write_lock);

        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            write_table(&path, &name, &rows)
        })
            .await
            .map_err(|e| SinkError::Io(std::io::Error::other(e.to_string())))??;

        info!("✓ uploaded {} rows to {}", count, table);
        Ok(())
    }
}

fn write_table(path: &Path, name: &str, rows: &RowSet) -> Result<(), SinkError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let exists = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    if exists {
        let mut reader = csv::Reader::from_path(path)?;
        let existing: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if existing != rows.columns {
            return Err(SinkError::SchemaMismatch {
                table: name.to_string(),
                existing: existing.join(","),
                incoming: rows.columns.join(","),
            });
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if !exists {
        wtr.write_record(&rows.columns)?;
    }
    for row in &rows.rows {
        wtr.write_record(row.iter().map(cell))?;
    }
    wtr.flush()?;
    Ok(())
}

fn cell(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
