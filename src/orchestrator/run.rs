//! Workflow run state.

use crate::task::{Task, TaskSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Phase of a workflow run. Transitions are strictly ordered and monotonic;
/// no phase is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunPhase {
    #[default]
    ContextFetch,
    Planning,
    Implementation,
    Validation,
    Documentation,
    CommitPush,
    Completed,
    Failed,
}

impl RunPhase {
    /// Check if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub duration: Duration,
}

/// One workflow run owning a batch of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub name: String,
    pub phase: RunPhase,
    pub tasks: Vec<Task>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: RunMetrics,
    /// Phase at which an unhandled error aborted the run.
    pub failed_phase: Option<RunPhase>,
    /// Reason the advisory commit step was skipped, if it was.
    pub commit_skipped: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Create a run from a submitted batch.
    pub fn new(name: &str, specs: Vec<TaskSpec>) -> Self {
        let tasks: Vec<Task> = specs.into_iter().map(Task::from_spec).collect();
        let total_tasks = tasks.len();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            phase: RunPhase::ContextFetch,
            tasks,
            errors: Vec::new(),
            warnings: Vec::new(),
            metrics: RunMetrics {
                total_tasks,
                ..Default::default()
            },
            failed_phase: None,
            commit_skipped: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Recompute completed/failed counters from task statuses.
    pub fn refresh_task_metrics(&mut self) {
        use crate::task::TaskStatus;
        self.metrics.completed_tasks = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        self.metrics.failed_tasks = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        debug_assert!(
            self.metrics.completed_tasks + self.metrics.failed_tasks <= self.metrics.total_tasks
        );
    }
}
