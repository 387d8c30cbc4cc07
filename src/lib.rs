pub mod backtest;
pub mod config;
pub mod sink;
pub mod storage;

pub use backtest::{JobError, JobOrchestrator, JobOutcome, JobParams};
pub use config::{WarehouseConfig, WorkerConfig};
