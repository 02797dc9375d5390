//! Worker execution wrapper with bounded retry and recovery classification.
//!
//! Each task attempt moves through precondition validation, execution, and
//! mandatory post-run bookkeeping. Precondition failures downgrade to
//! warnings and execution proceeds (fail-open). Execution errors are
//! classified by a pluggable recovery policy: retryable errors are re-invoked
//! from scratch up to the configured bound, terminal errors stop immediately
//! and mark the task so the owning run hard-stops after its lanes finish.
//! Terminal state lives on the task, never on this shared executor, so
//! concurrent runs cannot observe each other's failures.

use crate::config::OrchestratorConfig;
use crate::dispatch::TaskExecutor;
use crate::errors::TaskError;
use crate::monitor::{AlertSeverity, MonitoringEngine};
use crate::task::{Task, TaskResult};
use crate::traits::{ContentGenerator, ContextProvider, ErrorEntry, ErrorSeverity, ErrorSink, Ledger};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Recovery decision for a caught execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Re-invoke execution from scratch, within the retry budget.
    Retry,
    /// Unrecoverable; stop immediately regardless of remaining budget.
    Terminal,
}

/// Pluggable classification of execution errors.
pub trait RecoveryPolicy: Send + Sync {
    fn classify(&self, error: &anyhow::Error) -> RecoveryAction;
}

/// Default policy: typed [`TaskError`]s carry their own classification;
/// untyped errors mentioning an unrecoverable environment stop, everything
/// else retries.
#[derive(Debug, Default)]
pub struct DefaultRecoveryPolicy;

impl RecoveryPolicy for DefaultRecoveryPolicy {
    fn classify(&self, error: &anyhow::Error) -> RecoveryAction {
        if let Some(task_err) = error.downcast_ref::<TaskError>() {
            return if task_err.is_terminal() {
                RecoveryAction::Terminal
            } else {
                RecoveryAction::Retry
            };
        }
        let message = format!("{error:#}").to_lowercase();
        if message.contains("unrecoverable") || message.contains("permission denied") {
            RecoveryAction::Terminal
        } else {
            RecoveryAction::Retry
        }
    }
}

/// Executes tasks through the content generator with retry and bookkeeping.
pub struct WorkerExecutor {
    generator: Arc<dyn ContentGenerator>,
    ledger: Arc<dyn Ledger>,
    context: Arc<dyn ContextProvider>,
    sink: Arc<dyn ErrorSink>,
    monitor: Arc<MonitoringEngine>,
    policy: Arc<dyn RecoveryPolicy>,
    max_retries: u32,
}

impl WorkerExecutor {
    pub fn new(
        config: &OrchestratorConfig,
        generator: Arc<dyn ContentGenerator>,
        ledger: Arc<dyn Ledger>,
        context: Arc<dyn ContextProvider>,
        sink: Arc<dyn ErrorSink>,
        monitor: Arc<MonitoringEngine>,
    ) -> Self {
        Self {
            generator,
            ledger,
            context,
            sink,
            monitor,
            policy: Arc::new(DefaultRecoveryPolicy),
            max_retries: config.max_retries,
        }
    }

    /// Replace the recovery policy.
    pub fn with_policy(mut self, policy: Arc<dyn RecoveryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Mandatory precondition validation: capability data must load and the
    /// task must arrive assigned and fresh. Failures do not block execution;
    /// they are returned as warnings.
    async fn check_preconditions(&self, task: &Task) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(e) = self.context.load_context().await {
            warnings.push(format!("capability data unavailable: {e:#}"));
        }
        if task.assigned_worker.is_none() {
            warnings.push("task reached execution without an assigned worker".to_string());
        }
        if !task.errors.is_empty() {
            warnings.push(format!(
                "task carries {} prior error(s) into execution",
                task.errors.len()
            ));
        }

        for warning in &warnings {
            warn!(task = %task.id, "precondition downgraded to warning: {warning}");
            self.sink.log(ErrorEntry::new(
                ErrorSeverity::Low,
                "worker:precondition",
                warning,
            ));
        }
        warnings
    }

    fn record_terminal(&self, task: &Task, worker: &str, message: &str) {
        error!(task = %task.id, worker, "terminal error: {message}");
        self.sink.log(ErrorEntry::new(
            ErrorSeverity::Critical,
            &format!("worker:{worker}"),
            message,
        ));
        self.monitor.raise_alert(
            AlertSeverity::Critical,
            "terminal-error",
            message,
            json!({ "task_id": task.id, "worker": worker }),
        );
    }
}

#[async_trait]
impl TaskExecutor for WorkerExecutor {
    async fn execute(&self, mut task: Task) -> Task {
        let worker = task
            .assigned_worker
            .clone()
            .unwrap_or_else(|| "unassigned".to_string());
        let start = Instant::now();

        task.start();
        self.monitor.task_started(&worker);

        let mut warnings = self.check_preconditions(&task).await;

        let prompt = format!("{}: {}", task.task_type, task.description);
        let budget = 1 + self.max_retries;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.generator.generate(&prompt, &task.task_type).await {
                Ok(output) => {
                    // Post-run bookkeeping is mandatory but its failure is a
                    // warning on the successful result, not a task failure.
                    if let Err(e) = self.ledger.record_outcome(task.id, &output).await {
                        let warning = format!("outcome not recorded to ledger: {e:#}");
                        warn!(task = %task.id, "{warning}");
                        self.sink.log(ErrorEntry::new(
                            ErrorSeverity::Medium,
                            &format!("worker:{worker}"),
                            &warning,
                        ));
                        warnings.push(warning);
                    }

                    let duration = start.elapsed();
                    self.monitor.task_completed(&worker, duration);
                    task.complete(TaskResult {
                        output,
                        warnings,
                        attempts,
                        duration,
                    });
                    return task;
                }
                Err(e) => match self.policy.classify(&e) {
                    RecoveryAction::Retry if attempts < budget => {
                        debug!(task = %task.id, attempts, "retryable failure, re-invoking: {e:#}");
                    }
                    RecoveryAction::Retry => {
                        let message =
                            format!("retries exhausted after {attempts} attempts: {e:#}");
                        self.sink.log(ErrorEntry::new(
                            ErrorSeverity::Medium,
                            &format!("worker:{worker}"),
                            &message,
                        ));
                        self.monitor.task_failed(&worker, start.elapsed(), &message);
                        task.fail(&message);
                        return task;
                    }
                    RecoveryAction::Terminal => {
                        let message = format!("terminal error: {e:#}");
                        self.record_terminal(&task, &worker, &message);
                        self.monitor.task_failed(&worker, start.elapsed(), &message);
                        task.fail_terminal(&message);
                        return task;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskSpec, TaskStatus};
    use crate::traits::{MemoryLedger, StaticContextProvider, TracingErrorSink};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Generator scripted to fail a fixed number of times before succeeding.
    struct FlakyGenerator {
        calls: AtomicU32,
        failures: u32,
        terminal: bool,
    }

    impl FlakyGenerator {
        fn failing_forever() -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures: u32::MAX,
                terminal: false,
            }
        }

        fn terminal() -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures: u32::MAX,
                terminal: true,
            }
        }

        fn failing(failures: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                terminal: false,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentGenerator for FlakyGenerator {
        async fn generate(&self, prompt: &str, _task_type: &str) -> anyhow::Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.terminal {
                return Err(TaskError::Terminal("environment gone".into()).into());
            }
            if call < self.failures {
                return Err(TaskError::Retryable("transient".into()).into());
            }
            Ok(format!("done: {prompt}"))
        }
    }

    struct FailingLedger;

    #[async_trait]
    impl Ledger for FailingLedger {
        async fn record_outcome(&self, _id: uuid::Uuid, _summary: &str) -> anyhow::Result<()> {
            anyhow::bail!("ledger offline")
        }
    }

    fn executor(generator: Arc<FlakyGenerator>) -> (Arc<WorkerExecutor>, Arc<TracingErrorSink>) {
        let sink = Arc::new(TracingErrorSink::new());
        let executor = WorkerExecutor::new(
            &OrchestratorConfig::standard(),
            generator,
            Arc::new(MemoryLedger::new()),
            Arc::new(StaticContextProvider::default()),
            sink.clone(),
            Arc::new(MonitoringEngine::new()),
        );
        (Arc::new(executor), sink)
    }

    fn assigned_task() -> Task {
        let mut task = Task::from_spec(TaskSpec::new("bug-fix", "null pointer", "backend"));
        task.assign("backend-bot");
        task
    }

    #[tokio::test]
    async fn always_retryable_failure_is_invoked_exactly_one_plus_max_retries_times() {
        let generator = Arc::new(FlakyGenerator::failing_forever());
        let (executor, _) = executor(generator.clone());

        let task = executor.execute(assigned_task()).await;

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(generator.calls(), 1 + crate::config::MAX_RETRIES);
        assert!(!task.terminal_failure);
    }

    #[tokio::test]
    async fn retryable_failure_within_budget_recovers() {
        let generator = Arc::new(FlakyGenerator::failing(2));
        let (executor, _) = executor(generator.clone());

        let task = executor.execute(assigned_task()).await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(generator.calls(), 3);
        assert_eq!(task.result.unwrap().attempts, 3);
    }

    #[tokio::test]
    async fn terminal_error_stops_immediately_and_marks_the_task() {
        let generator = Arc::new(FlakyGenerator::terminal());
        let (executor, sink) = executor(generator.clone());

        let task = executor.execute(assigned_task()).await;

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(generator.calls(), 1);
        assert!(task.terminal_failure);
        assert!(
            sink.entries()
                .iter()
                .any(|e| e.severity == ErrorSeverity::Critical)
        );
    }

    #[tokio::test]
    async fn ledger_failure_is_a_warning_on_a_successful_result() {
        let sink = Arc::new(TracingErrorSink::new());
        let executor = Arc::new(WorkerExecutor::new(
            &OrchestratorConfig::standard(),
            Arc::new(FlakyGenerator::failing(0)),
            Arc::new(FailingLedger),
            Arc::new(StaticContextProvider::default()),
            sink.clone(),
            Arc::new(MonitoringEngine::new()),
        ));

        let task = executor.execute(assigned_task()).await;

        assert_eq!(task.status, TaskStatus::Completed);
        let result = task.result.unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("ledger")));
    }

    #[tokio::test]
    async fn precondition_failure_downgrades_and_execution_proceeds() {
        struct BrokenContext;

        #[async_trait]
        impl ContextProvider for BrokenContext {
            async fn load_context(&self) -> anyhow::Result<crate::traits::ProjectContext> {
                anyhow::bail!("context store unreachable")
            }
        }

        let executor = Arc::new(WorkerExecutor::new(
            &OrchestratorConfig::standard(),
            Arc::new(FlakyGenerator::failing(0)),
            Arc::new(MemoryLedger::new()),
            Arc::new(BrokenContext),
            Arc::new(TracingErrorSink::new()),
            Arc::new(MonitoringEngine::new()),
        ));

        let task = executor.execute(assigned_task()).await;

        assert_eq!(task.status, TaskStatus::Completed);
        let result = task.result.unwrap();
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.contains("capability data unavailable"))
        );
    }

    #[test]
    fn default_policy_classifies_typed_and_untyped_errors() {
        let policy = DefaultRecoveryPolicy;
        assert_eq!(
            policy.classify(&TaskError::Retryable("x".into()).into()),
            RecoveryAction::Retry
        );
        assert_eq!(
            policy.classify(&TaskError::Terminal("x".into()).into()),
            RecoveryAction::Terminal
        );
        assert_eq!(
            policy.classify(&anyhow::anyhow!("unrecoverable environment error")),
            RecoveryAction::Terminal
        );
        assert_eq!(
            policy.classify(&anyhow::anyhow!("connection reset")),
            RecoveryAction::Retry
        );
    }
}
