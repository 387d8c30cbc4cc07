pub mod engine;
pub mod model;
pub mod orchestrator;
pub mod statistics;

pub use engine::{EngineError, HttpSimulationEngine, SimulationEngine, SimulationRequest};
pub use model::{JobError, JobOutcome, JobParams, JobStatus, StrategyKind};
pub use orchestrator::JobOrchestrator;
pub use statistics::{ReductionError, StatisticsEngine};
