//! Validation coordinator.
//!
//! For each completed unit of work the coordinator fans out to the area's
//! configured validator set, runs every validator concurrently, and fans the
//! results back into one request verdict. A validator's failure (error return
//! or panic) is captured into its own result slot and never aborts the
//! fan-out. Completion is signalled through a watch channel, so collectors
//! await a notification instead of polling.

use crate::config::OrchestratorConfig;
use crate::errors::{ConfigError, ValidationError};
use crate::traits::{Validator, ValidatorOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle status of a validation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One validator's result slot within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorSlot {
    Outcome(ValidatorOutcome),
    Error { error: String },
}

impl ValidatorSlot {
    /// A slot is clean when the validator ran without error and did not
    /// explicitly report a failed outcome.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Outcome(o) if o.passed)
    }

    /// The captured error message, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Outcome(_) => None,
        }
    }
}

/// One validation request for one unit of completed work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub id: Uuid,
    pub work_id: String,
    pub area: String,
    pub validator_ids: Vec<String>,
    pub status: ValidationStatus,
    pub results: HashMap<String, ValidatorSlot>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ValidationRequest {
    /// Whether every validator slot is present and clean.
    pub fn all_clean(&self) -> bool {
        self.validator_ids.len() == self.results.len()
            && self.results.values().all(ValidatorSlot::is_clean)
    }
}

#[derive(Default)]
struct CoordinatorState {
    requests: HashMap<Uuid, ValidationRequest>,
    by_work: HashMap<String, Uuid>,
    done: HashMap<Uuid, watch::Receiver<bool>>,
}

/// Coordinates validator fan-out for completed work.
pub struct ValidationCoordinator {
    areas: HashMap<String, Vec<String>>,
    validators: HashMap<String, Arc<dyn Validator>>,
    state: Arc<Mutex<CoordinatorState>>,
}

impl ValidationCoordinator {
    /// Build the coordinator. Every validator id referenced by an area must
    /// be registered; absence is a startup configuration error.
    pub fn new(
        config: &OrchestratorConfig,
        validators: HashMap<String, Arc<dyn Validator>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        for (area, ids) in &config.areas {
            for id in ids {
                if !validators.contains_key(id) {
                    return Err(ConfigError::UnregisteredValidator {
                        area: area.clone(),
                        validator: id.clone(),
                    });
                }
            }
        }
        Ok(Self {
            areas: config.areas.clone(),
            validators,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
        })
    }

    /// Create a request for `work_id` in `area` and start the fan-out.
    ///
    /// Returns the request id immediately; validators run in the background.
    /// An unknown area is a configuration error, not a silent default.
    pub fn create_validation_request(
        &self,
        work_id: &str,
        area: &str,
    ) -> Result<Uuid, ValidationError> {
        let validator_ids = self
            .areas
            .get(area)
            .ok_or_else(|| ValidationError::UnknownArea {
                area: area.to_string(),
            })?
            .clone();

        let request = ValidationRequest {
            id: Uuid::new_v4(),
            work_id: work_id.to_string(),
            area: area.to_string(),
            validator_ids: validator_ids.clone(),
            status: ValidationStatus::Pending,
            results: HashMap::new(),
            created_at: Utc::now(),
            completed_at: None,
        };
        let request_id = request.id;

        let (done_tx, done_rx) = watch::channel(false);
        {
            let mut state = self.state.lock().expect("coordinator lock poisoned");
            state.by_work.insert(work_id.to_string(), request_id);
            state.done.insert(request_id, done_rx);
            state.requests.insert(request_id, request);
        }

        // Snapshot the validator handles before moving into the driver task.
        let members: Vec<(String, Arc<dyn Validator>)> = validator_ids
            .iter()
            .map(|id| (id.clone(), self.validators[id].clone()))
            .collect();
        let state = self.state.clone();
        let work = work_id.to_string();

        tokio::spawn(async move {
            {
                let mut state = state.lock().expect("coordinator lock poisoned");
                if let Some(request) = state.requests.get_mut(&request_id) {
                    request.status = ValidationStatus::InProgress;
                }
            }
            let slots = run_fan_out(members, &work).await;
            let all_clean = slots.values().all(ValidatorSlot::is_clean);

            let mut state = state.lock().expect("coordinator lock poisoned");
            if let Some(request) = state.requests.get_mut(&request_id) {
                request.results = slots;
                request.status = if all_clean {
                    ValidationStatus::Completed
                } else {
                    ValidationStatus::Failed
                };
                request.completed_at = Some(Utc::now());
            }
            drop(state);
            done_tx.send(true).ok();
        });

        debug!(work_id, area, %request_id, "validation request created");
        Ok(request_id)
    }

    /// Await the request for `work_id` leaving `pending`/`in_progress`, then
    /// return its final snapshot.
    pub async fn collect_validation_results(
        &self,
        work_id: &str,
    ) -> Result<ValidationRequest, ValidationError> {
        let (request_id, mut done_rx) = {
            let state = self.state.lock().expect("coordinator lock poisoned");
            let id = *state
                .by_work
                .get(work_id)
                .ok_or_else(|| ValidationError::RequestNotFound {
                    work_id: work_id.to_string(),
                })?;
            (id, state.done[&id].clone())
        };

        while !*done_rx.borrow() {
            done_rx
                .changed()
                .await
                .map_err(|_| ValidationError::RequestAbandoned { id: request_id })?;
        }

        let state = self.state.lock().expect("coordinator lock poisoned");
        state
            .requests
            .get(&request_id)
            .cloned()
            .ok_or(ValidationError::RequestAbandoned { id: request_id })
    }

    /// Point-in-time snapshot of a request.
    pub fn get_request(&self, request_id: Uuid) -> Option<ValidationRequest> {
        self.state
            .lock()
            .expect("coordinator lock poisoned")
            .requests
            .get(&request_id)
            .cloned()
    }
}

/// Run every fan-out member on its own task and gather the slots. Errors and
/// panics land in the member's slot; no member aborts its peers.
async fn run_fan_out(
    members: Vec<(String, Arc<dyn Validator>)>,
    work_id: &str,
) -> HashMap<String, ValidatorSlot> {
    let handles: Vec<(String, tokio::task::JoinHandle<anyhow::Result<ValidatorOutcome>>)> =
        members
            .into_iter()
            .map(|(id, validator)| {
                let work = work_id.to_string();
                let handle = tokio::spawn(async move { validator.run(&work).await });
                (id, handle)
            })
            .collect();

    let mut slots = HashMap::with_capacity(handles.len());
    for (id, handle) in handles {
        let slot = match handle.await {
            Ok(Ok(outcome)) => ValidatorSlot::Outcome(outcome),
            Ok(Err(e)) => {
                warn!(validator = %id, "validator failed: {e:#}");
                ValidatorSlot::Error {
                    error: format!("{e:#}"),
                }
            }
            Err(join_err) => {
                warn!(validator = %id, "validator panicked");
                ValidatorSlot::Error {
                    error: format!("validator panicked: {join_err}"),
                }
            }
        };
        slots.insert(id, slot);
    }
    slots
}
