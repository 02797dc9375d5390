//! Top-level workflow orchestrator.
//!
//! Drives a run through the fixed phase order context-fetch → planning →
//! implementation → validation → documentation → commit-push. Any unhandled
//! error moves the run directly to `Failed`, records the phase it failed in,
//! and stops; no further phases execute.

use crate::config::OrchestratorConfig;
use crate::dispatch::{self, ParallelTrackScheduler, TaskDistributor};
use crate::gates::QualityGateEngine;
use crate::monitor::{AlertSeverity, Dashboard, MonitoringEngine};
use crate::orchestrator::{RunPhase, WorkflowRun};
use crate::task::{TaskSpec, TaskStatus};
use crate::traits::{ContentGenerator, ContextProvider, Ledger};
use crate::validation::{ValidationCoordinator, ValidationStatus};
use crate::worker::WorkerExecutor;
use anyhow::Context;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Owns run lifecycles and wires the scheduler, gate engine, and validation
/// coordinator together. One instance per process, injected everywhere —
/// there are no hidden singletons.
pub struct WorkflowOrchestrator {
    workflow_gate: String,
    distributor: TaskDistributor,
    scheduler: ParallelTrackScheduler,
    gates: Arc<QualityGateEngine>,
    coordinator: Arc<ValidationCoordinator>,
    context: Arc<dyn ContextProvider>,
    generator: Arc<dyn ContentGenerator>,
    ledger: Arc<dyn Ledger>,
    monitor: Arc<MonitoringEngine>,
    runs: Mutex<HashMap<Uuid, WorkflowRun>>,
}

impl WorkflowOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &OrchestratorConfig,
        executor: Arc<WorkerExecutor>,
        gates: Arc<QualityGateEngine>,
        coordinator: Arc<ValidationCoordinator>,
        context: Arc<dyn ContextProvider>,
        generator: Arc<dyn ContentGenerator>,
        ledger: Arc<dyn Ledger>,
        monitor: Arc<MonitoringEngine>,
    ) -> Self {
        Self {
            workflow_gate: config.workflow_gate.clone(),
            distributor: TaskDistributor::new(config),
            scheduler: ParallelTrackScheduler::new(executor),
            gates,
            coordinator,
            context,
            generator,
            ledger,
            monitor,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a batch and drive its run to a terminal phase.
    pub async fn submit_batch(&self, name: &str, specs: Vec<TaskSpec>) -> Uuid {
        let run = WorkflowRun::new(name, specs);
        let run_id = run.id;
        info!(run = %run_id, name, tasks = run.metrics.total_tasks, "batch submitted");
        self.store(&run);

        let run = self.drive(run).await;
        self.store(&run);
        run_id
    }

    /// Point-in-time snapshot of a run.
    pub fn get_run(&self, run_id: Uuid) -> Option<WorkflowRun> {
        self.runs
            .lock()
            .expect("run store lock poisoned")
            .get(&run_id)
            .cloned()
    }

    /// Standalone gate invocation, usable outside a full run.
    pub async fn run_gate(&self, gate_name: &str) -> crate::gates::GateResult {
        self.gates.run_gate(gate_name).await
    }

    /// Read-only operational aggregate.
    pub fn dashboard(&self) -> Dashboard {
        self.monitor.dashboard()
    }

    fn store(&self, run: &WorkflowRun) {
        self.runs
            .lock()
            .expect("run store lock poisoned")
            .insert(run.id, run.clone());
    }

    fn enter(&self, run: &mut WorkflowRun, phase: RunPhase) {
        run.phase = phase;
        info!(run = %run.id, ?phase, "entering phase");
        self.store(run);
    }

    async fn drive(&self, mut run: WorkflowRun) -> WorkflowRun {
        let started = Instant::now();

        match self.run_phases(&mut run).await {
            Ok(()) => {
                run.phase = RunPhase::Completed;
                info!(
                    run = %run.id,
                    completed = run.metrics.completed_tasks,
                    failed = run.metrics.failed_tasks,
                    "run completed"
                );
            }
            Err(e) => {
                run.failed_phase = Some(run.phase);
                run.errors.push(format!("{e:#}"));
                run.phase = RunPhase::Failed;
                warn!(run = %run.id, failed_phase = ?run.failed_phase, "run failed: {e:#}");
                self.monitor.raise_alert(
                    AlertSeverity::Critical,
                    "workflow-failed",
                    &format!("run '{}' failed: {e:#}", run.name),
                    json!({ "run_id": run.id, "phase": run.failed_phase }),
                );
            }
        }

        run.metrics.duration = started.elapsed();
        run.finished_at = Some(chrono::Utc::now());
        self.monitor.record_run(
            run.id,
            run.metrics.duration,
            run.phase == RunPhase::Completed,
        );
        run
    }

    async fn run_phases(&self, run: &mut WorkflowRun) -> anyhow::Result<()> {
        // context-fetch: the snapshot is immutable for the rest of the run.
        self.enter(run, RunPhase::ContextFetch);
        let _context = self
            .context
            .load_context()
            .await
            .context("context fetch failed")?;

        // planning: every task gets its worker, exactly once.
        self.enter(run, RunPhase::Planning);
        for task in &mut run.tasks {
            let worker = self.distributor.assign(task).to_string();
            task.assign(&worker);
        }

        // implementation: three lanes, isolated failures.
        self.enter(run, RunPhase::Implementation);
        let tasks = std::mem::take(&mut run.tasks);
        run.tasks = self.scheduler.run_tracks(dispatch::partition(tasks)).await;
        run.refresh_task_metrics();
        for task in &run.tasks {
            if task.status == TaskStatus::Failed {
                for error in &task.errors {
                    run.errors.push(format!("task '{}': {error}", task.description));
                }
            }
        }
        // Terminal state is carried on this run's own tasks, so concurrent
        // runs never observe each other's failures.
        if run.tasks.iter().any(|t| t.terminal_failure) {
            anyhow::bail!("terminal error during implementation, hard stop");
        }

        // validation: workflow gate plus per-task validator fan-out.
        self.enter(run, RunPhase::Validation);
        let gate = self.gates.run_gate(&self.workflow_gate).await;
        run.warnings.extend(gate.warnings.iter().cloned());
        if !gate.passed {
            run.errors.push(format!(
                "gate '{}' failed: blocking checks [{}]",
                gate.gate_name,
                gate.blocking_failures.join(", ")
            ));
        }
        self.validate_tasks(run).await;

        // documentation: best-effort, never fails the run.
        self.enter(run, RunPhase::Documentation);
        self.write_documentation(run).await;

        // commit-push: advisory. Skipped when errors are present, and the
        // run still completes with the skip noted.
        self.enter(run, RunPhase::CommitPush);
        if run.errors.is_empty() {
            if let Err(e) = self
                .ledger
                .record_outcome(run.id, &format!("commit: run '{}'", run.name))
                .await
            {
                run.warnings.push(format!("commit not recorded: {e:#}"));
            }
        } else {
            let reason = format!("{} error(s) present at commit entry", run.errors.len());
            info!(run = %run.id, "commit skipped: {reason}");
            run.commit_skipped = Some(reason);
        }

        Ok(())
    }

    /// Fan each completed task out to its area's validators and fold the
    /// verdicts into the run.
    async fn validate_tasks(&self, run: &mut WorkflowRun) {
        let mut pending = Vec::new();
        for task in &run.tasks {
            if task.status != TaskStatus::Completed {
                continue;
            }
            let work_id = task.id.to_string();
            match self.coordinator.create_validation_request(&work_id, &task.area) {
                Ok(_) => pending.push((work_id, task.description.clone())),
                Err(e) => run.errors.push(format!(
                    "validation misconfigured for task '{}': {e}",
                    task.description
                )),
            }
        }

        for (work_id, description) in pending {
            match self.coordinator.collect_validation_results(&work_id).await {
                Ok(request) if request.status == ValidationStatus::Completed => {}
                Ok(request) => {
                    let unclean = request
                        .results
                        .iter()
                        .filter(|(_, slot)| !slot.is_clean())
                        .map(|(id, _)| id.clone())
                        .collect::<Vec<_>>()
                        .join(", ");
                    run.errors.push(format!(
                        "validation failed for task '{description}': [{unclean}]"
                    ));
                }
                Err(e) => run
                    .errors
                    .push(format!("validation lost for task '{description}': {e}")),
            }
        }
    }

    async fn write_documentation(&self, run: &mut WorkflowRun) {
        let prompt = format!(
            "changelog for run '{}': {} completed, {} failed",
            run.name, run.metrics.completed_tasks, run.metrics.failed_tasks
        );
        match self.generator.generate(&prompt, "documentation").await {
            Ok(docs) => {
                if let Err(e) = self.ledger.record_outcome(run.id, &docs).await {
                    run.warnings.push(format!("documentation not recorded: {e:#}"));
                }
            }
            Err(e) => run
                .warnings
                .push(format!("documentation generation failed: {e:#}")),
        }
    }
}
