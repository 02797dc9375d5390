//! Process-wide monitoring engine.
//!
//! Per-worker counters, per-gate pass rates, workflow duration records, and
//! an alert ring buffer. This is the only state mutated from multiple
//! concurrent contexts; every mutation is a counter increment or append
//! behind one mutex, and no lock is held across an await point.

use crate::gates::GateResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Cap on retained alerts; older alerts are evicted first.
const ALERT_CAP: usize = 100;

/// Cap on the per-worker recent error window.
const RECENT_ERROR_CAP: usize = 10;

/// Observed state of one worker identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    #[default]
    Idle,
    Error,
}

/// Sliding-window record per worker identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub status: WorkerStatus,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub avg_duration: Duration,
    pub last_activity: DateTime<Utc>,
    pub recent_errors: VecDeque<String>,
}

impl WorkerMetrics {
    fn new() -> Self {
        Self {
            status: WorkerStatus::Idle,
            tasks_completed: 0,
            tasks_failed: 0,
            avg_duration: Duration::ZERO,
            last_activity: Utc::now(),
            recent_errors: VecDeque::new(),
        }
    }

    fn record_duration(&mut self, duration: Duration) {
        let n = self.tasks_completed + self.tasks_failed;
        debug_assert!(n > 0);
        let total = self.avg_duration * (n - 1) as u32 + duration;
        self.avg_duration = total / n as u32;
    }
}

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// One alert in the capped ring buffer. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub alert_type: String,
    pub message: String,
    pub context: serde_json::Value,
    pub acknowledged: bool,
}

/// Pass-rate counters for one gate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GateStats {
    pub runs: u64,
    pub passed: u64,
}

impl GateStats {
    pub fn pass_rate(&self) -> f64 {
        if self.runs == 0 {
            return 1.0;
        }
        self.passed as f64 / self.runs as f64
    }
}

/// Record of one finished workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub duration: Duration,
    pub success: bool,
    pub finished_at: DateTime<Utc>,
}

/// Overall process health derived from worker states and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Read-only aggregate for operational tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub workers: HashMap<String, WorkerMetrics>,
    pub gates: HashMap<String, GateStats>,
    pub runs: Vec<RunRecord>,
    pub health: HealthStatus,
    pub alerts: Vec<Alert>,
    pub summary: String,
}

#[derive(Default)]
struct MonitorState {
    workers: HashMap<String, WorkerMetrics>,
    gates: HashMap<String, GateStats>,
    runs: Vec<RunRecord>,
    alerts: VecDeque<Alert>,
}

/// Process-wide metrics sink and alert aggregator.
#[derive(Default)]
pub struct MonitoringEngine {
    inner: Mutex<MonitorState>,
}

impl MonitoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MonitorState) -> R) -> R {
        let mut state = self.inner.lock().expect("monitor lock poisoned");
        f(&mut state)
    }

    /// Record that a worker picked up a task.
    pub fn task_started(&self, worker: &str) {
        self.with_state(|state| {
            let metrics = state
                .workers
                .entry(worker.to_string())
                .or_insert_with(WorkerMetrics::new);
            metrics.status = WorkerStatus::Active;
            metrics.last_activity = Utc::now();
        });
    }

    /// Record a successful task completion.
    pub fn task_completed(&self, worker: &str, duration: Duration) {
        self.with_state(|state| {
            let metrics = state
                .workers
                .entry(worker.to_string())
                .or_insert_with(WorkerMetrics::new);
            metrics.tasks_completed += 1;
            metrics.record_duration(duration);
            metrics.status = WorkerStatus::Idle;
            metrics.last_activity = Utc::now();
        });
    }

    /// Record a task failure with its error message.
    pub fn task_failed(&self, worker: &str, duration: Duration, error: &str) {
        self.with_state(|state| {
            let metrics = state
                .workers
                .entry(worker.to_string())
                .or_insert_with(WorkerMetrics::new);
            metrics.tasks_failed += 1;
            metrics.record_duration(duration);
            metrics.status = WorkerStatus::Error;
            metrics.last_activity = Utc::now();
            metrics.recent_errors.push_back(error.to_string());
            while metrics.recent_errors.len() > RECENT_ERROR_CAP {
                metrics.recent_errors.pop_front();
            }
        });
    }

    /// Update pass-rate counters from a finished gate run.
    pub fn record_gate(&self, result: &GateResult) {
        self.with_state(|state| {
            let stats = state.gates.entry(result.gate_name.clone()).or_default();
            stats.runs += 1;
            if result.passed {
                stats.passed += 1;
            }
        });
    }

    /// Record a finished workflow run.
    pub fn record_run(&self, run_id: Uuid, duration: Duration, success: bool) {
        self.with_state(|state| {
            state.runs.push(RunRecord {
                run_id,
                duration,
                success,
                finished_at: Utc::now(),
            });
        });
    }

    /// Raise an alert into the ring buffer, evicting the oldest past the cap.
    pub fn raise_alert(
        &self,
        severity: AlertSeverity,
        alert_type: &str,
        message: &str,
        context: serde_json::Value,
    ) -> Uuid {
        let alert = Alert {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            context,
            acknowledged: false,
        };
        let id = alert.id;
        self.with_state(|state| {
            state.alerts.push_back(alert);
            while state.alerts.len() > ALERT_CAP {
                state.alerts.pop_front();
            }
        });
        id
    }

    /// Acknowledge an alert by id. Returns false if it has been evicted.
    pub fn acknowledge(&self, alert_id: Uuid) -> bool {
        self.with_state(|state| {
            for alert in state.alerts.iter_mut() {
                if alert.id == alert_id {
                    alert.acknowledged = true;
                    return true;
                }
            }
            false
        })
    }

    /// Gate pass rate over all recorded runs of that gate.
    pub fn gate_pass_rate(&self, gate_name: &str) -> Option<f64> {
        self.with_state(|state| state.gates.get(gate_name).map(GateStats::pass_rate))
    }

    /// Derive health from worker states and unacknowledged alerts.
    pub fn health(&self) -> HealthStatus {
        self.with_state(|state| Self::health_of(state))
    }

    fn health_of(state: &MonitorState) -> HealthStatus {
        let critical = state
            .alerts
            .iter()
            .any(|a| !a.acknowledged && a.severity == AlertSeverity::Critical);
        if critical {
            return HealthStatus::Unhealthy;
        }
        let degraded = state
            .workers
            .values()
            .any(|w| w.status == WorkerStatus::Error)
            || state
                .alerts
                .iter()
                .any(|a| !a.acknowledged && a.severity == AlertSeverity::Error);
        if degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Full read-only snapshot for operational tooling.
    pub fn dashboard(&self) -> Dashboard {
        self.with_state(|state| {
            let total_runs = state.runs.len();
            let succeeded = state.runs.iter().filter(|r| r.success).count();
            let summary = format!(
                "{} workers, {} gates, {}/{} runs succeeded",
                state.workers.len(),
                state.gates.len(),
                succeeded,
                total_runs
            );
            Dashboard {
                workers: state.workers.clone(),
                gates: state.gates.clone(),
                runs: state.runs.clone(),
                health: Self::health_of(state),
                alerts: state.alerts.iter().cloned().collect(),
                summary,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_counters_and_average_duration() {
        let monitor = MonitoringEngine::new();
        monitor.task_started("backend-bot");
        monitor.task_completed("backend-bot", Duration::from_millis(100));
        monitor.task_started("backend-bot");
        monitor.task_failed("backend-bot", Duration::from_millis(300), "boom");

        let dashboard = monitor.dashboard();
        let metrics = &dashboard.workers["backend-bot"];
        assert_eq!(metrics.tasks_completed, 1);
        assert_eq!(metrics.tasks_failed, 1);
        assert_eq!(metrics.avg_duration, Duration::from_millis(200));
        assert_eq!(metrics.status, WorkerStatus::Error);
        assert_eq!(metrics.recent_errors.len(), 1);
    }

    #[test]
    fn recent_errors_window_is_capped() {
        let monitor = MonitoringEngine::new();
        for i in 0..15 {
            monitor.task_failed("qa-bot", Duration::from_millis(1), &format!("err {i}"));
        }
        let dashboard = monitor.dashboard();
        let errors = &dashboard.workers["qa-bot"].recent_errors;
        assert_eq!(errors.len(), 10);
        assert_eq!(errors.front().unwrap(), "err 5");
        assert_eq!(errors.back().unwrap(), "err 14");
    }

    #[test]
    fn alert_ring_buffer_evicts_oldest() {
        let monitor = MonitoringEngine::new();
        for i in 0..110 {
            monitor.raise_alert(
                AlertSeverity::Info,
                "test",
                &format!("alert {i}"),
                serde_json::Value::Null,
            );
        }
        let dashboard = monitor.dashboard();
        assert_eq!(dashboard.alerts.len(), 100);
        assert_eq!(dashboard.alerts[0].message, "alert 10");
    }

    #[test]
    fn health_derivation() {
        let monitor = MonitoringEngine::new();
        assert_eq!(monitor.health(), HealthStatus::Healthy);

        monitor.task_failed("ops-bot", Duration::from_millis(1), "deploy failed");
        assert_eq!(monitor.health(), HealthStatus::Degraded);

        let id = monitor.raise_alert(
            AlertSeverity::Critical,
            "terminal",
            "environment unreachable",
            serde_json::Value::Null,
        );
        assert_eq!(monitor.health(), HealthStatus::Unhealthy);

        assert!(monitor.acknowledge(id));
        assert_eq!(monitor.health(), HealthStatus::Degraded);
    }

    #[test]
    fn gate_pass_rate_tracks_runs() {
        use crate::gates::GateResult;
        let monitor = MonitoringEngine::new();
        assert!(monitor.gate_pass_rate("pre-commit").is_none());

        let mut result = GateResult {
            gate_name: "pre-commit".into(),
            passed: true,
            checks: Vec::new(),
            blocking_failures: Vec::new(),
            warnings: Vec::new(),
            total_duration: Duration::ZERO,
            timestamp: Utc::now(),
            bypassed: false,
        };
        monitor.record_gate(&result);
        result.passed = false;
        monitor.record_gate(&result);

        assert_eq!(monitor.gate_pass_rate("pre-commit"), Some(0.5));
    }

    #[test]
    fn run_records_show_in_summary() {
        let monitor = MonitoringEngine::new();
        monitor.record_run(Uuid::new_v4(), Duration::from_secs(2), true);
        monitor.record_run(Uuid::new_v4(), Duration::from_secs(3), false);
        let dashboard = monitor.dashboard();
        assert_eq!(dashboard.runs.len(), 2);
        assert!(dashboard.summary.contains("1/2 runs succeeded"));
    }
}
