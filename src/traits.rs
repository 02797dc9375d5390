//! External collaborator interfaces.
//!
//! The core treats content generation, document persistence, project context,
//! check commands, and error logging as opaque collaborators behind these
//! traits. Production wiring injects real implementations; tests and the demo
//! binary inject the in-memory ones defined at the bottom of this module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Read-only project snapshot loaded at the start of a run. Later phases
/// treat it as immutable for that run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectContext {
    pub schema: Vec<String>,
    pub routes: Vec<String>,
    pub style_tokens: Vec<String>,
    pub rule_docs: Vec<String>,
}

/// Raw output of one external check command invocation.
#[derive(Debug, Clone)]
pub struct CheckOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Severity attached to entries sent to the error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// One structured entry for the external error/audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: ErrorSeverity,
    /// Subsystem that produced the entry, e.g. "gate:pre-commit".
    pub source: String,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(severity: ErrorSeverity, source: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            source: source.to_string(),
            message: message.to_string(),
        }
    }
}

/// Outcome reported by one validator for one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorOutcome {
    pub passed: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ValidatorOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            notes: Vec::new(),
        }
    }

    pub fn fail(note: &str) -> Self {
        Self {
            passed: false,
            notes: vec![note.to_string()],
        }
    }
}

/// Loads the read-only project context snapshot.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn load_context(&self) -> anyhow::Result<ProjectContext>;
}

/// Runs one named external check (linter, type checker, test runner, ...).
///
/// Implementations receive the caller's timeout so they can terminate the
/// underlying process themselves; the check runner additionally cancels the
/// whole invocation when the timeout elapses.
#[async_trait]
pub trait CheckCommand: Send + Sync {
    async fn run(&self, name: &str, timeout: Duration) -> anyhow::Result<CheckOutput>;
}

/// Generates content for a task. Opaque to the core; in production this is a
/// language-model call.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, task_type: &str) -> anyhow::Result<String>;
}

/// Persists task and run outcomes to an external ledger (git, documentation
/// store). Opaque to the core.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record_outcome(&self, id: Uuid, summary: &str) -> anyhow::Result<()>;
}

/// Structured error/audit log.
pub trait ErrorSink: Send + Sync {
    fn log(&self, entry: ErrorEntry);
}

/// One independent checker invoked in parallel with its peers against a
/// completed unit of work.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn run(&self, work_id: &str) -> anyhow::Result<ValidatorOutcome>;
}

/// Context provider returning a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    pub context: ProjectContext,
}

#[async_trait]
impl ContextProvider for StaticContextProvider {
    async fn load_context(&self) -> anyhow::Result<ProjectContext> {
        Ok(self.context.clone())
    }
}

/// Error sink that forwards entries to `tracing` and keeps them in memory
/// for inspection.
#[derive(Debug, Default)]
pub struct TracingErrorSink {
    entries: Mutex<Vec<ErrorEntry>>,
}

impl TracingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.entries.lock().expect("error sink lock poisoned").clone()
    }
}

impl ErrorSink for TracingErrorSink {
    fn log(&self, entry: ErrorEntry) {
        match entry.severity {
            ErrorSeverity::Low => tracing::debug!(source = %entry.source, "{}", entry.message),
            ErrorSeverity::Medium => tracing::warn!(source = %entry.source, "{}", entry.message),
            ErrorSeverity::High | ErrorSeverity::Critical => {
                tracing::error!(source = %entry.source, severity = ?entry.severity, "{}", entry.message)
            }
        }
        self.entries.lock().expect("error sink lock poisoned").push(entry);
    }
}

/// Generator that produces a canned summary. Used by the demo binary; real
/// deployments wire an LLM-backed implementation.
#[derive(Debug, Default)]
pub struct TemplateGenerator;

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(&self, prompt: &str, task_type: &str) -> anyhow::Result<String> {
        Ok(format!("[{task_type}] {prompt}"))
    }
}

/// Ledger that records outcomes in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<(Uuid, String)>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Uuid, String)> {
        self.records.lock().expect("ledger lock poisoned").clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn record_outcome(&self, id: Uuid, summary: &str) -> anyhow::Result<()> {
        self.records
            .lock()
            .expect("ledger lock poisoned")
            .push((id, summary.to_string()));
        Ok(())
    }
}

/// Validator that always reports a pass. Demo wiring.
#[derive(Debug, Default)]
pub struct AlwaysPassValidator;

#[async_trait]
impl Validator for AlwaysPassValidator {
    async fn run(&self, _work_id: &str) -> anyhow::Result<ValidatorOutcome> {
        Ok(ValidatorOutcome::pass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_context_provider_returns_snapshot() {
        let provider = StaticContextProvider {
            context: ProjectContext {
                schema: vec!["users".into()],
                ..Default::default()
            },
        };
        let ctx = provider.load_context().await.unwrap();
        assert_eq!(ctx.schema, vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn memory_ledger_records_outcomes() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();
        ledger.record_outcome(id, "fixed null pointer").await.unwrap();
        let records = ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, id);
    }

    #[test]
    fn tracing_sink_keeps_entries() {
        let sink = TracingErrorSink::new();
        sink.log(ErrorEntry::new(ErrorSeverity::Medium, "gate:pre-commit", "lint failed"));
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, ErrorSeverity::Medium);
    }
}
