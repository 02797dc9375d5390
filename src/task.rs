//! Task domain types.
//!
//! A [`Task`] is created when a batch is submitted, mutated only by the lane
//! executing it, and immutable once it reaches a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Priority of a task within its lane. Informational only; lanes still
/// execute in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// A task as submitted by a caller, before the orchestrator owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Short type tag, e.g. "bug-fix", "feature", "optimize".
    pub task_type: String,
    /// Free-form description used for keyword routing.
    pub description: String,
    /// Project area the task belongs to, e.g. "backend".
    pub area: String,
    #[serde(default)]
    pub priority: TaskPriority,
}

impl TaskSpec {
    pub fn new(task_type: &str, description: &str, area: &str) -> Self {
        Self {
            task_type: task_type.to_string(),
            description: description.to_string(),
            area: area.to_string(),
            priority: TaskPriority::default(),
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Functional outcome of one executed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Generated output summary.
    pub output: String,
    /// Non-fatal issues attached to an otherwise successful outcome
    /// (precondition downgrades, bookkeeping failures).
    pub warnings: Vec<String>,
    /// Number of execution attempts consumed, including the first.
    pub attempts: u32,
    pub duration: Duration,
}

/// One unit of work owned by a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: String,
    pub description: String,
    pub area: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Worker identity, set exactly once during planning.
    pub assigned_worker: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub errors: Vec<String>,
    /// Set when a failure was classified terminal. The owning run inspects
    /// this after its lanes finish and aborts if any task carries it.
    #[serde(default)]
    pub terminal_failure: bool,
}

impl Task {
    /// Create a pending task from a submitted spec.
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: spec.task_type,
            description: spec.description,
            area: spec.area,
            priority: spec.priority,
            status: TaskStatus::Pending,
            assigned_worker: None,
            started_at: None,
            finished_at: None,
            result: None,
            errors: Vec::new(),
            terminal_failure: false,
        }
    }

    /// Routing text: type and description combined, lowercased once here so
    /// matchers stay substring checks.
    pub fn routing_text(&self) -> String {
        format!("{} {}", self.task_type, self.description).to_lowercase()
    }

    /// Assign a worker. The assignment happens exactly once, before execution
    /// starts; a second call is a programming error.
    pub fn assign(&mut self, worker: &str) {
        debug_assert!(
            self.assigned_worker.is_none(),
            "worker assigned twice for task {}",
            self.id
        );
        self.assigned_worker = Some(worker.to_string());
    }

    /// Mark the task as started.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Mark the task as completed with its result.
    pub fn complete(&mut self, result: TaskResult) {
        self.status = TaskStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    /// Mark the task as failed with an error message.
    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.errors.push(error.to_string());
    }

    /// Mark the task as failed by an unrecoverable error.
    pub fn fail_terminal(&mut self, error: &str) {
        self.fail(error);
        self.terminal_failure = true;
    }
}
