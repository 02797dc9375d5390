//! Quality gate engine.
//!
//! A gate is a named, ordered set of checks with a blocking policy. Checks
//! run sequentially within a gate: they are external tools sharing one
//! working tree, so a later check must observe the file-system effects of an
//! earlier one. Gates never run concurrently against the same target; the
//! engine serializes runs behind an execution lock.

use crate::checks::{CheckResult, CheckRunner};
use crate::config::{GateConfig, OrchestratorConfig};
use crate::errors::ConfigError;
use crate::monitor::MonitoringEngine;
use crate::traits::{ErrorEntry, ErrorSeverity, ErrorSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Aggregated verdict for one gate run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub gate_name: String,
    /// Logical AND of all blocking-check results. A bypassed (disabled or
    /// unknown) gate reports `true` with no checks.
    pub passed: bool,
    pub checks: Vec<CheckResult>,
    /// Names of failed blocking checks.
    pub blocking_failures: Vec<String>,
    /// Warning lines from failed non-blocking checks.
    pub warnings: Vec<String>,
    pub total_duration: Duration,
    pub timestamp: DateTime<Utc>,
    /// Set when the gate was disabled or unknown and therefore bypassed.
    pub bypassed: bool,
}

impl GateResult {
    fn bypass(gate_name: &str) -> Self {
        Self {
            gate_name: gate_name.to_string(),
            passed: true,
            checks: Vec::new(),
            blocking_failures: Vec::new(),
            warnings: Vec::new(),
            total_duration: Duration::ZERO,
            timestamp: Utc::now(),
            bypassed: true,
        }
    }
}

/// Runs gates and aggregates per-check results into gate verdicts.
pub struct QualityGateEngine {
    gates: HashMap<String, GateConfig>,
    runner: CheckRunner,
    sink: Arc<dyn ErrorSink>,
    monitor: Arc<MonitoringEngine>,
    history: Mutex<Vec<GateResult>>,
    /// The working tree is exclusively owned by the running gate.
    run_lock: tokio::sync::Mutex<()>,
}

impl QualityGateEngine {
    /// Build the engine from validated configuration.
    pub fn new(
        config: &OrchestratorConfig,
        runner: CheckRunner,
        sink: Arc<dyn ErrorSink>,
        monitor: Arc<MonitoringEngine>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let gates = config
            .gates
            .iter()
            .map(|g| (g.name.clone(), g.clone()))
            .collect();
        Ok(Self {
            gates,
            runner,
            sink,
            monitor,
            history: Mutex::new(Vec::new()),
            run_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Run a named gate and return its verdict.
    ///
    /// A disabled or unknown gate yields an immediate passing bypass result:
    /// an explicit no-op, not a silent failure.
    pub async fn run_gate(&self, gate_name: &str) -> GateResult {
        let Some(gate) = self.gates.get(gate_name).filter(|g| g.enabled) else {
            info!(gate = gate_name, "gate disabled or unknown, bypassing");
            let result = GateResult::bypass(gate_name);
            self.record(&result, None);
            return result;
        };

        let _guard = self.run_lock.lock().await;
        let start = Instant::now();
        info!(gate = gate_name, checks = gate.checks.len(), "running gate");

        let mut checks = Vec::with_capacity(gate.checks.len());
        let mut blocking_failures = Vec::new();
        let mut warnings = Vec::new();

        for check in &gate.checks {
            let result = self.runner.run_check(&check.name, gate.timeout).await;
            if !result.passed {
                if check.blocking {
                    blocking_failures.push(check.name.clone());
                } else {
                    warn!(gate = gate_name, check = %check.name, "non-blocking check failed");
                    warnings.push(format!("non-blocking check '{}' failed", check.name));
                }
            }
            checks.push(result);
        }

        let result = GateResult {
            gate_name: gate_name.to_string(),
            passed: blocking_failures.is_empty(),
            checks,
            blocking_failures,
            warnings,
            total_duration: start.elapsed(),
            timestamp: Utc::now(),
            bypassed: false,
        };

        self.record(&result, Some(gate));
        result
    }

    /// Append to history, update metrics, and report failures to the sink.
    fn record(&self, result: &GateResult, gate: Option<&GateConfig>) {
        // Bypassed runs stay in history but never feed pass-rate stats; a
        // bypass is not evidence the checks would pass.
        if !result.bypassed {
            self.monitor.record_gate(result);
        }

        if !result.passed {
            // One sink entry per failed gate run, severity from the gate's
            // blocking flag.
            let severity = match gate {
                Some(g) if g.blocking => ErrorSeverity::High,
                _ => ErrorSeverity::Medium,
            };
            self.sink.log(ErrorEntry::new(
                severity,
                &format!("gate:{}", result.gate_name),
                &format!(
                    "gate failed: blocking checks [{}]",
                    result.blocking_failures.join(", ")
                ),
            ));
        }

        self.history
            .lock()
            .expect("gate history lock poisoned")
            .push(result.clone());
    }

    /// Snapshot of all gate runs so far, oldest first.
    pub fn history(&self) -> Vec<GateResult> {
        self.history
            .lock()
            .expect("gate history lock poisoned")
            .clone()
    }
}
