//! Task routing and parallel track scheduling.
//!
//! [`TaskDistributor`] maps a task to a capability-matched worker identity by
//! keyword routing; routing is pure and total (the fallback worker guarantees
//! an answer). [`ParallelTrackScheduler`] partitions a batch into three fixed
//! lanes and drives the lanes concurrently while each lane executes its tasks
//! strictly sequentially in submission order.

use crate::config::{OrchestratorConfig, RoutingRule};
use crate::task::Task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Keywords classifying a task into the stability lane.
const STABILITY_KEYWORDS: &[&str] = &["bug", "fix", "regression", "qa", "test", "coverage"];

/// Keywords classifying a task into the optimization lane.
const OPTIMIZATION_KEYWORDS: &[&str] = &["optim", "refactor", "perf", "slow", "cleanup"];

/// Case-insensitive substring match of any keyword against the routing text.
fn matches_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| text.contains(&k.to_lowercase()))
}

/// Routes tasks to capability-matched workers.
pub struct TaskDistributor {
    rules: Vec<RoutingRule>,
    fallback: String,
}

impl TaskDistributor {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            rules: config.routing.clone(),
            fallback: config.fallback_worker.clone(),
        }
    }

    /// Assign a worker identity. First matching rule wins; unmatched tasks
    /// fall back to the generic worker.
    pub fn assign(&self, task: &Task) -> &str {
        let text = task.routing_text();
        for rule in &self.rules {
            if matches_any(&text, &rule.keywords) {
                return &rule.worker;
            }
        }
        &self.fallback
    }
}

/// One of the three fixed concurrent execution lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    /// Bug fixes and QA work.
    Stability,
    /// Default lane: feature and everything unclassified.
    Feature,
    /// Optimization and refactoring work.
    Optimization,
}

/// Classify a task into its lane. Coarser than worker routing: stability
/// keywords win, then optimization, everything else defaults to feature.
pub fn classify_track(task: &Task) -> Track {
    let text = task.routing_text();
    if STABILITY_KEYWORDS.iter().any(|k| text.contains(k)) {
        Track::Stability
    } else if OPTIMIZATION_KEYWORDS.iter().any(|k| text.contains(k)) {
        Track::Optimization
    } else {
        Track::Feature
    }
}

/// A batch partitioned into the three lanes, submission order preserved
/// within each lane.
#[derive(Debug, Default)]
pub struct TrackPartition {
    pub stability: Vec<Task>,
    pub feature: Vec<Task>,
    pub optimization: Vec<Task>,
}

impl TrackPartition {
    pub fn total(&self) -> usize {
        self.stability.len() + self.feature.len() + self.optimization.len()
    }
}

/// Partition a batch into lanes.
pub fn partition(tasks: Vec<Task>) -> TrackPartition {
    let mut partition = TrackPartition::default();
    for task in tasks {
        match classify_track(&task) {
            Track::Stability => partition.stability.push(task),
            Track::Feature => partition.feature.push(task),
            Track::Optimization => partition.optimization.push(task),
        }
    }
    partition
}

/// Executes one task to a terminal status. Implementations never propagate
/// task failures; a failed task comes back with `TaskStatus::Failed`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: Task) -> Task;
}

/// Drives the three lanes concurrently.
pub struct ParallelTrackScheduler {
    executor: Arc<dyn TaskExecutor>,
}

impl ParallelTrackScheduler {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self { executor }
    }

    /// Run all three lanes to completion and return every task in a terminal
    /// state. Joins all lanes; a failure inside one lane never halts the
    /// others.
    pub async fn run_tracks(&self, partition: TrackPartition) -> Vec<Task> {
        let lanes = [
            (Track::Stability, partition.stability),
            (Track::Feature, partition.feature),
            (Track::Optimization, partition.optimization),
        ];

        let handles: Vec<_> = lanes
            .into_iter()
            .map(|(track, tasks)| {
                let executor = self.executor.clone();
                tokio::spawn(async move {
                    debug!(?track, count = tasks.len(), "lane started");
                    let mut done = Vec::with_capacity(tasks.len());
                    for task in tasks {
                        done.push(executor.execute(task).await);
                    }
                    debug!(?track, "lane finished");
                    done
                })
            })
            .collect();

        let mut all = Vec::new();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(tasks) => all.extend(tasks),
                Err(e) => warn!("lane task join failed: {e}"),
            }
        }
        all
    }
}
