use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use rustbt::backtest::{HttpSimulationEngine, JobError, JobOrchestrator, JobOutcome, JobParams};
use rustbt::sink::AnySink;
use rustbt::storage::{self, BacktestRecordStore, BacktestRepository};
use rustbt::WorkerConfig;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "rustbt", about = "Backtest job worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one job from a JSON parameter document (`-` reads stdin)
    Run {
        #[arg(long, default_value = "-")]
        params: PathBuf,
    },
    /// Print a job's status and statistics
    Status { job_id: Uuid },
    /// Create the backtest tables
    InitDb,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    // .env is optional, the process environment wins
    dotenv::dotenv().ok();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("rustbt", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    let cli = Cli::parse();
    let cfg = WorkerConfig::from_env()?;

    match cli.command {
        Command::Run { params } => run_job(&cfg, &params).await,
        Command::Status { job_id } => show_status(&cfg, job_id).await,
        Command::InitDb => {
            storage::establish_connection(&cfg.database_url, cfg.db_max_connections).await?;
            info!("tables ready at {}", cfg.database_url);
            Ok(())
        }
    }
}

fn read_params(path: &Path) -> Result<JobParams> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading job parameters from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading job parameters from {}", path.display()))?
    };
    serde_json::from_str(&raw).context("parsing job parameters")
}

async fn run_job(cfg: &WorkerConfig, params_path: &Path) -> Result<()> {
    let params = read_params(params_path)?;
    let job_id = params.job_id;

    let engine = Arc::new(HttpSimulationEngine::new(
        cfg.require_engine_url()?.to_string(),
        Duration::from_secs(cfg.engine_timeout_secs),
    )?);

    // testing jobs never open the record store or the warehouse
    if params.testing {
        let result = JobOrchestrator::preview(engine.as_ref(), params).await;
        return report(job_id, result);
    }

    let db = storage::establish_connection(&cfg.database_url, cfg.db_max_connections)
        .await
        .context("connecting to the record store")?;
    let store = Arc::new(BacktestRepository::new(Arc::new(db)));
    let sink = Arc::new(AnySink::from_config(cfg)?);
    info!("warehouse: {} dataset {}", sink.kind(), cfg.dataset);

    let orchestrator = JobOrchestrator::new(engine, sink, store, cfg.dataset.clone());
    let result = orchestrator.run(params).await;
    report(job_id, result)
}

fn report(job_id: Uuid, result: Result<JobOutcome, JobError>) -> Result<()> {
    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({ "job_id": job_id, "kind": e.kind(), "error": e.to_string() })
            );
            Err(e.into())
        }
    }
}

async fn show_status(cfg: &WorkerConfig, job_id: Uuid) -> Result<()> {
    let db = storage::establish_connection(&cfg.database_url, cfg.db_max_connections).await?;
    let store = BacktestRepository::new(Arc::new(db));
    match store.find_job(job_id).await? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => anyhow::bail!("job {} not found", job_id),
    }
}
