//! Workflow orchestration: run state machine and the top-level runner.

mod run;
mod runner;

pub use run::{RunMetrics, RunPhase, WorkflowRun};
pub use runner::WorkflowOrchestrator;
