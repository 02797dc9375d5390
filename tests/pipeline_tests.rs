//! End-to-end pipeline scenarios: batch submission through planning, lanes,
//! gates, validation, and commit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crew::checks::CheckRunner;
use crew::config::{GateCheck, GateConfig, OrchestratorConfig};
use crew::dispatch::{self, Track};
use crew::gates::QualityGateEngine;
use crew::monitor::MonitoringEngine;
use crew::orchestrator::{RunPhase, WorkflowOrchestrator};
use crew::task::{Task, TaskSpec, TaskStatus};
use crew::traits::{
    CheckCommand, CheckOutput, ContentGenerator, MemoryLedger, StaticContextProvider,
    TracingErrorSink, Validator, ValidatorOutcome,
};
use crew::validation::{ValidationCoordinator, ValidationStatus, ValidatorSlot};
use crew::worker::WorkerExecutor;

/// Check command where listed checks fail and everything else passes.
struct ScriptedChecks {
    failing: Vec<&'static str>,
}

#[async_trait]
impl CheckCommand for ScriptedChecks {
    async fn run(&self, name: &str, _timeout: Duration) -> anyhow::Result<CheckOutput> {
        let exit_code = if self.failing.contains(&name) { 1 } else { 0 };
        Ok(CheckOutput {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code != 0 {
                format!("{name} reported problems")
            } else {
                String::new()
            },
        })
    }
}

/// Generator that fails tasks whose description carries a marker.
struct MarkerGenerator;

#[async_trait]
impl ContentGenerator for MarkerGenerator {
    async fn generate(&self, prompt: &str, _task_type: &str) -> anyhow::Result<String> {
        if prompt.contains("always-fails") {
            return Err(crew::errors::TaskError::Retryable("scripted".into()).into());
        }
        if prompt.contains("hard-stop") {
            // Fail slowly so other work can be in flight when this lands.
            tokio::time::sleep(Duration::from_millis(50)).await;
            return Err(crew::errors::TaskError::Terminal("environment gone".into()).into());
        }
        Ok(format!("done: {prompt}"))
    }
}

struct PassValidator;

#[async_trait]
impl Validator for PassValidator {
    async fn run(&self, _work_id: &str) -> anyhow::Result<ValidatorOutcome> {
        Ok(ValidatorOutcome::pass())
    }
}

struct ThrowingValidator;

#[async_trait]
impl Validator for ThrowingValidator {
    async fn run(&self, _work_id: &str) -> anyhow::Result<ValidatorOutcome> {
        anyhow::bail!("validator exploded")
    }
}

fn pass_validators(config: &OrchestratorConfig) -> HashMap<String, Arc<dyn Validator>> {
    let mut validators: HashMap<String, Arc<dyn Validator>> = HashMap::new();
    for ids in config.areas.values() {
        for id in ids {
            validators.insert(id.clone(), Arc::new(PassValidator));
        }
    }
    validators
}

fn orchestrator(
    config: OrchestratorConfig,
    failing_checks: Vec<&'static str>,
) -> (WorkflowOrchestrator, Arc<MemoryLedger>, Arc<MonitoringEngine>) {
    let monitor = Arc::new(MonitoringEngine::new());
    let sink = Arc::new(TracingErrorSink::new());
    let ledger = Arc::new(MemoryLedger::new());
    let context = Arc::new(StaticContextProvider::default());
    let generator = Arc::new(MarkerGenerator);

    let engine = Arc::new(
        QualityGateEngine::new(
            &config,
            CheckRunner::new(Arc::new(ScriptedChecks {
                failing: failing_checks,
            })),
            sink.clone(),
            monitor.clone(),
        )
        .unwrap(),
    );
    let coordinator =
        Arc::new(ValidationCoordinator::new(&config, pass_validators(&config)).unwrap());
    let executor = Arc::new(WorkerExecutor::new(
        &config,
        generator.clone(),
        ledger.clone(),
        context.clone(),
        sink,
        monitor.clone(),
    ));

    let orchestrator = WorkflowOrchestrator::new(
        &config,
        executor,
        engine,
        coordinator,
        context,
        generator,
        ledger.clone(),
        monitor.clone(),
    );
    (orchestrator, ledger, monitor)
}

fn demo_batch() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new("bug-fix", "null pointer", "backend"),
        TaskSpec::new("optimize", "slow query", "backend"),
        TaskSpec::new("ui", "button color", "frontend"),
    ]
}

#[test]
fn demo_batch_partitions_into_three_tracks() {
    let tasks: Vec<Task> = demo_batch().into_iter().map(Task::from_spec).collect();
    assert_eq!(dispatch::classify_track(&tasks[0]), Track::Stability);
    assert_eq!(dispatch::classify_track(&tasks[1]), Track::Optimization);
    assert_eq!(dispatch::classify_track(&tasks[2]), Track::Feature);

    let partition = dispatch::partition(tasks);
    assert_eq!(partition.stability.len(), 1);
    assert_eq!(partition.optimization.len(), 1);
    assert_eq!(partition.feature.len(), 1);
}

#[tokio::test]
async fn clean_batch_reaches_completed_with_commit() {
    let (orchestrator, ledger, _) = orchestrator(OrchestratorConfig::standard(), vec![]);

    let run_id = orchestrator.submit_batch("nightly", demo_batch()).await;
    let run = orchestrator.get_run(run_id).unwrap();

    assert_eq!(run.phase, RunPhase::Completed);
    assert_eq!(run.metrics.total_tasks, 3);
    assert_eq!(run.metrics.completed_tasks, 3);
    assert_eq!(run.metrics.failed_tasks, 0);
    assert!(run.errors.is_empty());
    assert!(run.commit_skipped.is_none());
    assert!(run.tasks.iter().all(|t| t.assigned_worker.is_some()));

    // Per-task outcomes, documentation, and the commit all hit the ledger.
    let records = ledger.records();
    assert!(records.iter().any(|(_, s)| s.starts_with("commit:")));
    assert!(records.len() >= 5);
}

#[tokio::test]
async fn task_metrics_are_conserved_after_implementation() {
    let (orchestrator, _, _) = orchestrator(OrchestratorConfig::standard(), vec![]);
    let mut batch = demo_batch();
    batch.push(TaskSpec::new("bug-fix", "always-fails in parser", "backend"));

    let run_id = orchestrator.submit_batch("mixed", batch).await;
    let run = orchestrator.get_run(run_id).unwrap();

    assert_eq!(
        run.metrics.completed_tasks + run.metrics.failed_tasks,
        run.metrics.total_tasks
    );
    assert_eq!(run.metrics.failed_tasks, 1);
}

#[tokio::test]
async fn lane_failure_does_not_prevent_other_lanes_completing() {
    let (orchestrator, _, _) = orchestrator(OrchestratorConfig::standard(), vec![]);

    let run_id = orchestrator
        .submit_batch(
            "isolation",
            vec![
                TaskSpec::new("bug-fix", "always-fails here", "backend"),
                TaskSpec::new("ui", "button color", "frontend"),
                TaskSpec::new("optimize", "slow query", "backend"),
            ],
        )
        .await;
    let run = orchestrator.get_run(run_id).unwrap();

    // The failing stability-lane task surfaces as a run error, and the run
    // completes with the commit skipped.
    assert_eq!(run.phase, RunPhase::Completed);
    assert_eq!(run.metrics.completed_tasks, 2);
    assert_eq!(run.metrics.failed_tasks, 1);
    assert!(!run.errors.is_empty());
    assert!(run.commit_skipped.is_some());

    let failed: Vec<_> = run
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].description.contains("always-fails"));
}

#[tokio::test]
async fn terminal_error_fails_the_run_at_implementation() {
    let (orchestrator, _, monitor) = orchestrator(OrchestratorConfig::standard(), vec![]);

    let run_id = orchestrator
        .submit_batch(
            "doomed",
            vec![TaskSpec::new("bug-fix", "hard-stop environment", "backend")],
        )
        .await;
    let run = orchestrator.get_run(run_id).unwrap();

    assert_eq!(run.phase, RunPhase::Failed);
    assert_eq!(run.failed_phase, Some(RunPhase::Implementation));
    assert!(run.errors.iter().any(|e| e.contains("hard stop")));

    let dashboard = monitor.dashboard();
    assert!(
        dashboard
            .alerts
            .iter()
            .any(|a| a.alert_type == "terminal-error")
    );
}

#[tokio::test]
async fn terminal_error_in_one_run_leaves_a_concurrent_run_untouched() {
    let (orchestrator, _, _) = orchestrator(OrchestratorConfig::standard(), vec![]);

    let (doomed_id, clean_id) = tokio::join!(
        orchestrator.submit_batch(
            "doomed",
            vec![TaskSpec::new("bug-fix", "hard-stop environment", "backend")],
        ),
        orchestrator.submit_batch(
            "clean",
            vec![TaskSpec::new("ui", "button color", "frontend")],
        ),
    );

    let doomed = orchestrator.get_run(doomed_id).unwrap();
    assert_eq!(doomed.phase, RunPhase::Failed);
    assert_eq!(doomed.failed_phase, Some(RunPhase::Implementation));

    let clean = orchestrator.get_run(clean_id).unwrap();
    assert_eq!(clean.phase, RunPhase::Completed);
    assert_eq!(clean.metrics.completed_tasks, 1);
    assert!(clean.errors.is_empty());
    assert!(clean.commit_skipped.is_none());
}

#[tokio::test]
async fn blocking_gate_failure_becomes_a_run_error() {
    let (orchestrator, _, _) = orchestrator(OrchestratorConfig::standard(), vec!["lint"]);

    let run_id = orchestrator.submit_batch("gated", demo_batch()).await;
    let run = orchestrator.get_run(run_id).unwrap();

    assert_eq!(run.phase, RunPhase::Completed);
    assert!(run.errors.iter().any(|e| e.contains("gate 'pre-commit'")));
    assert!(run.commit_skipped.is_some());
}

#[tokio::test]
async fn non_blocking_gate_failure_is_only_a_warning() {
    let (orchestrator, ledger, _) =
        orchestrator(OrchestratorConfig::standard(), vec!["style-tokens"]);

    let run_id = orchestrator.submit_batch("advisory", demo_batch()).await;
    let run = orchestrator.get_run(run_id).unwrap();

    assert_eq!(run.phase, RunPhase::Completed);
    assert!(run.errors.is_empty());
    assert!(run.warnings.iter().any(|w| w.contains("style-tokens")));
    assert!(ledger.records().iter().any(|(_, s)| s.starts_with("commit:")));
}

#[tokio::test]
async fn two_check_gate_splits_blocking_error_and_warning() {
    // Gate configured with exactly the two checks under test.
    let mut config = OrchestratorConfig::standard();
    config.gates.retain(|g| g.name != "pre-commit");
    config.gates.push(GateConfig::new(
        "pre-commit",
        true,
        vec![
            GateCheck::blocking("lint"),
            GateCheck::advisory("style-tokens"),
        ],
    ));
    let (orchestrator, _, _) = orchestrator(config, vec!["lint", "style-tokens"]);

    let result = orchestrator.run_gate("pre-commit").await;
    assert!(!result.passed);
    assert_eq!(result.checks.len(), 2);
    assert_eq!(result.blocking_failures, vec!["lint".to_string()]);
    assert_eq!(result.warnings.len(), 1);
}

#[tokio::test]
async fn throwing_validator_fails_request_with_peer_intact() {
    let mut config = OrchestratorConfig::standard();
    config.areas.clear();
    config
        .areas
        .insert("backend".into(), vec!["a".to_string(), "b".to_string()]);

    let mut validators: HashMap<String, Arc<dyn Validator>> = HashMap::new();
    validators.insert("a".into(), Arc::new(ThrowingValidator));
    validators.insert("b".into(), Arc::new(PassValidator));
    let coordinator = ValidationCoordinator::new(&config, validators).unwrap();

    coordinator.create_validation_request("work-9", "backend").unwrap();
    let request = coordinator.collect_validation_results("work-9").await.unwrap();

    assert_eq!(request.status, ValidationStatus::Failed);
    assert!(
        request.results["a"]
            .error()
            .unwrap()
            .contains("validator exploded")
    );
    assert!(matches!(request.results["b"], ValidatorSlot::Outcome(_)));
}

#[tokio::test]
async fn get_run_returns_point_in_time_snapshots() {
    let (orchestrator, _, _) = orchestrator(OrchestratorConfig::standard(), vec![]);
    let run_id = orchestrator.submit_batch("snapshot", demo_batch()).await;

    let first = orchestrator.get_run(run_id).unwrap();
    let second = orchestrator.get_run(run_id).unwrap();
    assert_eq!(first.phase, second.phase);
    assert_eq!(first.metrics.total_tasks, second.metrics.total_tasks);
    assert!(orchestrator.get_run(uuid::Uuid::new_v4()).is_none());
}
