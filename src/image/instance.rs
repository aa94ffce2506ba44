use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::error::{CloudError, InstanceError};
use crate::models::{InstanceStatus, ObservedInstance};

#[derive(Debug)]
struct InstanceState {
    status: InstanceStatus,
    compute_id: Option<String>,
    folder_id: Option<String>,
    ip_address: Option<String>,
    started_at: DateTime<Utc>,
    properties: BTreeMap<String, String>,
    error: Option<InstanceError>,
}

/// One virtual machine owned by an image.
///
/// Identity is fixed at construction; everything else lives behind a lock and
/// changes through the methods below. Status changes follow the lifecycle
/// order of [`InstanceStatus::can_advance_to`].
#[derive(Debug)]
pub struct CloudInstance {
    name: String,
    source_id: String,
    zone: String,
    state: Mutex<InstanceState>,
}

impl CloudInstance {
    pub fn new(name: impl Into<String>, source_id: impl Into<String>, zone: impl Into<String>, status: InstanceStatus) -> Self {
        Self {
            name: name.into(),
            source_id: source_id.into(),
            zone: zone.into(),
            state: Mutex::new(InstanceState {
                status,
                compute_id: None,
                folder_id: None,
                ip_address: None,
                started_at: Utc::now(),
                properties: BTreeMap::new(),
                error: None,
            }),
        }
    }

    /// Adopt an instance found on the provider that this process did not start
    pub fn from_observed(source_id: &str, observed: &ObservedInstance) -> Self {
        let instance = Self::new(observed.name.clone(), source_id, observed.zone.clone(), observed.status);
        {
            let mut state = instance.state.lock();
            if let Some(created) = observed.created_at {
                state.started_at = created;
            }
        }
        instance.update_identity(observed);
        instance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn status(&self) -> InstanceStatus {
        self.state.lock().status
    }

    /// Move to `next` only if the instance is still in `expected`
    pub fn compare_and_set_status(&self, expected: InstanceStatus, next: InstanceStatus) -> bool {
        let mut state = self.state.lock();
        if state.status != expected {
            return false;
        }
        state.status = next;
        true
    }

    /// Move forward along the lifecycle; backward moves are refused
    pub fn advance_to(&self, next: InstanceStatus) -> bool {
        let mut state = self.state.lock();
        if !state.status.can_advance_to(next) {
            return false;
        }
        tracing::debug!(instance = %self.name, from = %state.status, to = %next, "Status change");
        state.status = next;
        true
    }

    /// Record a workflow failure and move to `Error` unless already terminal
    pub fn fail(&self, error: &CloudError) {
        let mut state = self.state.lock();
        state.error = Some(InstanceError::from_error(error));
        if state.status.can_advance_to(InstanceStatus::Error) {
            state.status = InstanceStatus::Error;
        }
    }

    pub fn error(&self) -> Option<InstanceError> {
        self.state.lock().error.clone()
    }

    pub fn compute_id(&self) -> Option<String> {
        self.state.lock().compute_id.clone()
    }

    pub fn set_compute_id(&self, compute_id: &str) {
        self.state.lock().compute_id = Some(compute_id.to_string());
    }

    pub fn folder_id(&self) -> Option<String> {
        self.state.lock().folder_id.clone()
    }

    pub fn set_folder_id(&self, folder_id: &str) {
        self.state.lock().folder_id = Some(folder_id.to_string());
    }

    pub fn ip_address(&self) -> Option<String> {
        self.state.lock().ip_address.clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.state.lock().started_at
    }

    pub fn properties(&self) -> BTreeMap<String, String> {
        self.state.lock().properties.clone()
    }

    /// Take what the provider reports for this instance.
    ///
    /// `Starting -> Running` is a compare-and-swap on the exact prior status;
    /// any other observed status applies only if it moves the lifecycle forward.
    pub fn apply_observed(&self, observed: &ObservedInstance) {
        self.update_identity(observed);
        match observed.status {
            InstanceStatus::Unknown => {}
            InstanceStatus::Running => {
                if !self.compare_and_set_status(InstanceStatus::Starting, InstanceStatus::Running) {
                    self.advance_to(InstanceStatus::Running);
                }
            }
            other => {
                self.advance_to(other);
            }
        }
    }

    fn update_identity(&self, observed: &ObservedInstance) {
        let mut state = self.state.lock();
        if !observed.compute_id.is_empty() {
            state.compute_id = Some(observed.compute_id.clone());
        }
        if !observed.folder_id.is_empty() {
            state.folder_id = Some(observed.folder_id.clone());
        }
        state.ip_address = observed.ip_address.clone();
        state.properties = observed.properties.clone();
    }
}
