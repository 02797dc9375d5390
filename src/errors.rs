//! Typed error hierarchy for the crew orchestration core.
//!
//! Three top-level enums cover the three subsystems:
//! - `TaskError` — worker execution failures, classified for retry
//! - `ValidationError` — validator fan-out and request lookup failures
//! - `ConfigError` — startup validation of gates, routing, and registries

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while a worker executes a task.
///
/// The recovery policy maps these (and foreign errors) onto a retry decision;
/// `Retryable` is re-attempted up to the configured bound, `Terminal` aborts
/// the run immediately.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("retryable failure: {0}")]
    Retryable(String),

    #[error("terminal failure: {0}")]
    Terminal(String),

    #[error("post-run bookkeeping failed: {0}")]
    PostRun(String),
}

impl TaskError {
    /// Whether this error must abort the run regardless of retry budget.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Errors from the validation coordinator.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no validators registered for area '{area}'")]
    UnknownArea { area: String },

    #[error("no validation request found for work item '{work_id}'")]
    RequestNotFound { work_id: String },

    #[error("validation request {id} was dropped before completion")]
    RequestAbandoned { id: Uuid },
}

/// Errors from startup validation of the orchestrator configuration.
///
/// Registries are checked once at construction; a missing registration is a
/// configuration error here, never a runtime fallback.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate gate '{0}'")]
    DuplicateGate(String),

    #[error("gate '{gate}' has an empty check list")]
    EmptyGate { gate: String },

    #[error("area '{area}' has an empty validator set")]
    EmptyValidatorSet { area: String },

    #[error("area '{area}' references unregistered validator '{validator}'")]
    UnregisteredValidator { area: String, validator: String },

    #[error("routing rule for worker '{worker}' has no keywords")]
    EmptyRoutingRule { worker: String },
}
