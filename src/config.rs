//! Typed orchestrator configuration.
//!
//! All registries (gates, routing rules, area→validator sets) are loaded once
//! at construction and validated eagerly; a missing or empty registration
//! fails startup instead of being null-checked at every use site.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default per-check timeout applied by the standard gates.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(120);

/// Retry bound for worker execution: a failing retryable task is invoked
/// `1 + MAX_RETRIES` times in total.
pub const MAX_RETRIES: u32 = 3;

/// One check inside a gate, with its blocking policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateCheck {
    pub name: String,
    /// A failing blocking check flips the whole gate to failed; a failing
    /// non-blocking check is recorded only as a warning.
    pub blocking: bool,
}

impl GateCheck {
    pub fn blocking(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocking: true,
        }
    }

    pub fn advisory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocking: false,
        }
    }
}

/// Static configuration of one quality gate. Read-only at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub name: String,
    pub enabled: bool,
    /// Gate-level policy: failures of a blocking gate are reported at high
    /// severity, failures of an advisory gate at medium.
    pub blocking: bool,
    /// Per-check timeout. A check exceeding it is forcibly terminated.
    pub timeout: Duration,
    pub checks: Vec<GateCheck>,
}

impl GateConfig {
    pub fn new(name: &str, blocking: bool, checks: Vec<GateCheck>) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            blocking,
            timeout: DEFAULT_CHECK_TIMEOUT,
            checks,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// One keyword routing rule: any keyword matching the task's routing text
/// assigns the task to `worker`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub keywords: Vec<String>,
    pub worker: String,
}

impl RoutingRule {
    pub fn new(worker: &str, keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            worker: worker.to_string(),
        }
    }
}

/// Complete orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub gates: Vec<GateConfig>,
    /// Ordered routing table; first matching rule wins.
    pub routing: Vec<RoutingRule>,
    /// Worker receiving tasks no rule matches. Routing is total.
    pub fallback_worker: String,
    /// Area name → validator ids invoked against completed work in that area.
    pub areas: HashMap<String, Vec<String>>,
    pub max_retries: u32,
    /// Gate run as part of a workflow run's validation phase.
    pub workflow_gate: String,
}

impl OrchestratorConfig {
    /// The standard gate set, routing table, and area registry.
    pub fn standard() -> Self {
        let gates = vec![
            GateConfig::new(
                "pre-commit",
                true,
                vec![
                    GateCheck::blocking("lint"),
                    GateCheck::blocking("type-check"),
                    GateCheck::blocking("forbidden-terms"),
                    GateCheck::advisory("style-tokens"),
                ],
            ),
            GateConfig::new(
                "pre-push",
                true,
                vec![
                    GateCheck::blocking("lint"),
                    GateCheck::blocking("type-check"),
                    GateCheck::blocking("unit-tests"),
                    GateCheck::blocking("compliance"),
                ],
            ),
            GateConfig::new(
                "pre-deploy",
                true,
                vec![
                    GateCheck::blocking("lint"),
                    GateCheck::blocking("type-check"),
                    GateCheck::blocking("unit-tests"),
                    GateCheck::blocking("e2e-tests"),
                    GateCheck::blocking("build"),
                    GateCheck::blocking("security"),
                ],
            ),
            GateConfig::new(
                "post-deploy",
                false,
                vec![
                    GateCheck::advisory("health-check"),
                    GateCheck::advisory("smoke-tests"),
                ],
            ),
        ];

        let routing = vec![
            RoutingRule::new("backend-bot", &["api", "database", "server"]),
            RoutingRule::new("frontend-bot", &["ui", "component", "styling"]),
            RoutingRule::new("qa-bot", &["test", "coverage"]),
            RoutingRule::new("docs-bot", &["doc", "wiki", "changelog"]),
            RoutingRule::new("ops-bot", &["deploy", "ci", "infra"]),
        ];

        let mut areas = HashMap::new();
        areas.insert(
            "backend".to_string(),
            vec!["schema-review".to_string(), "api-contract".to_string()],
        );
        areas.insert(
            "frontend".to_string(),
            vec!["style-review".to_string(), "accessibility".to_string()],
        );
        areas.insert("qa".to_string(), vec!["coverage-review".to_string()]);
        areas.insert("docs".to_string(), vec!["doc-review".to_string()]);
        areas.insert(
            "ops".to_string(),
            vec!["infra-review".to_string(), "security-review".to_string()],
        );

        Self {
            gates,
            routing,
            fallback_worker: "generalist-bot".to_string(),
            areas,
            max_retries: MAX_RETRIES,
            workflow_gate: "pre-commit".to_string(),
        }
    }

    /// Validate the configuration. Called once at startup by the components
    /// that consume it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for gate in &self.gates {
            if !seen.insert(gate.name.as_str()) {
                return Err(ConfigError::DuplicateGate(gate.name.clone()));
            }
            if gate.checks.is_empty() {
                return Err(ConfigError::EmptyGate {
                    gate: gate.name.clone(),
                });
            }
        }
        for rule in &self.routing {
            if rule.keywords.is_empty() {
                return Err(ConfigError::EmptyRoutingRule {
                    worker: rule.worker.clone(),
                });
            }
        }
        for (area, validators) in &self.areas {
            if validators.is_empty() {
                return Err(ConfigError::EmptyValidatorSet { area: area.clone() });
            }
        }
        Ok(())
    }

    /// Look up a gate config by name.
    pub fn gate(&self, name: &str) -> Option<&GateConfig> {
        self.gates.iter().find(|g| g.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_validates() {
        let config = OrchestratorConfig::standard();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn standard_gate_table_matches_policy() {
        let config = OrchestratorConfig::standard();

        let pre_commit = config.gate("pre-commit").unwrap();
        assert!(pre_commit.blocking);
        assert_eq!(pre_commit.checks.len(), 4);
        let style = pre_commit
            .checks
            .iter()
            .find(|c| c.name == "style-tokens")
            .unwrap();
        assert!(!style.blocking);

        let pre_deploy = config.gate("pre-deploy").unwrap();
        assert_eq!(pre_deploy.checks.len(), 6);
        assert!(pre_deploy.checks.iter().all(|c| c.blocking));

        let post_deploy = config.gate("post-deploy").unwrap();
        assert!(!post_deploy.blocking);
        assert!(post_deploy.checks.iter().all(|c| !c.blocking));
    }

    #[test]
    fn duplicate_gate_is_rejected() {
        let mut config = OrchestratorConfig::standard();
        config
            .gates
            .push(GateConfig::new("pre-commit", true, vec![GateCheck::blocking("lint")]));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateGate(name)) if name == "pre-commit"
        ));
    }

    #[test]
    fn empty_validator_set_is_rejected() {
        let mut config = OrchestratorConfig::standard();
        config.areas.insert("payments".into(), Vec::new());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyValidatorSet { area }) if area == "payments"
        ));
    }

    #[test]
    fn empty_gate_is_rejected() {
        let mut config = OrchestratorConfig::standard();
        config.gates.push(GateConfig::new("empty", true, Vec::new()));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyGate { gate }) if gate == "empty"
        ));
    }
}
