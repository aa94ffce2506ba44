use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::{CloudInstance, IdProvider, ImageDetails, ImageHandler};
use crate::connector::CloudConnector;
use crate::error::{CloudError, Result};
use crate::models::{AgentUserData, InstanceStatus, ObservedInstance};

type InstanceSet = Arc<Mutex<HashMap<String, Arc<CloudInstance>>>>;

/// Runtime side of an image: its template plus the instances created from it.
///
/// Workflows started here run on the tokio runtime under the image's
/// cancellation token. Callers get the placeholder instance back right away
/// and observe the outcome through its status, or await
/// [`CloudImage::wait_for_workflows`].
pub struct CloudImage {
    details: Arc<ImageDetails>,
    handler: ImageHandler,
    connector: Arc<dyn CloudConnector>,
    id_provider: Arc<dyn IdProvider>,
    // keyed by lowercased instance name
    instances: InstanceSet,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl CloudImage {
    pub fn new(details: ImageDetails, connector: Arc<dyn CloudConnector>, id_provider: Arc<dyn IdProvider>) -> Self {
        Self {
            details: Arc::new(details),
            handler: ImageHandler::new(Arc::clone(&connector)),
            connector,
            id_provider,
            instances: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.details.source_id
    }

    pub fn details(&self) -> &ImageDetails {
        &self.details
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Tracked instances ordered by name
    pub fn instances(&self) -> Vec<Arc<CloudInstance>> {
        let mut list: Vec<Arc<CloudInstance>> = self.instances.lock().values().cloned().collect();
        list.sort_by(|a, b| crate::utils::natural_cmp(a.name(), b.name()));
        list
    }

    pub fn find_instance(&self, name: &str) -> Option<Arc<CloudInstance>> {
        self.instances.lock().get(&name.to_lowercase()).cloned()
    }

    pub fn can_start_new_instance(&self) -> bool {
        let instances = self.instances.lock();
        active_count(&instances) < self.details.max_instances
    }

    /// Reserve a name, register a placeholder and create the machine in the background
    pub fn start_new_instance(&self, user_data: &AgentUserData) -> Result<Arc<CloudInstance>> {
        if self.is_disposed() {
            return Err(CloudError::Disposed(self.details.source_id.clone()));
        }

        let instance = {
            let mut instances = self.instances.lock();
            let active = active_count(&instances);
            if active >= self.details.max_instances {
                return Err(CloudError::QuotaExceeded(format!(
                    "image {} already runs {} of {} instances",
                    self.details.source_id, active, self.details.max_instances
                )));
            }
            let name = self.next_name(&instances)?;
            let instance = Arc::new(CloudInstance::new(
                name.clone(),
                self.details.source_id.clone(),
                self.details.zone.clone(),
                InstanceStatus::ScheduledToStart,
            ));
            instances.insert(name.to_lowercase(), Arc::clone(&instance));
            instance
        };
        tracing::info!(image = %self.details.source_id, instance = %instance.name(), "Scheduled new instance");

        let handler = self.handler.clone();
        let connector = Arc::clone(&self.connector);
        let details = Arc::clone(&self.details);
        let user_data = user_data.clone();
        let target = Arc::clone(&instance);
        let cancel = self.cancel.clone();
        // a create cancelled by dispose is failed and compensated like any other failure
        self.tasks.spawn(async move {
            let created = tokio::select! {
                result = handler.create_instance(&details, &target, &user_data) => result,
                _ = cancel.cancelled() => Err(CloudError::Disposed(details.source_id.clone())),
            };
            match created {
                Ok(()) => {
                    target.compare_and_set_status(InstanceStatus::ScheduledToStart, InstanceStatus::Starting);
                    match target.status() {
                        InstanceStatus::Starting | InstanceStatus::Running | InstanceStatus::Restarting => {
                            tracing::info!(instance = %target.name(), compute_id = ?target.compute_id(), "Instance created");
                            target.compare_and_set_status(InstanceStatus::Starting, InstanceStatus::Running);
                        }
                        status => {
                            tracing::info!(instance = %target.name(), %status, "Instance was terminated while being created");
                            compensate(connector.as_ref(), &target).await;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(instance = %target.name(), "Failed to create instance: {}", e);
                    target.fail(&e);
                    compensate(connector.as_ref(), &target).await;
                }
            }
        });

        Ok(instance)
    }

    pub fn restart_instance(&self, instance: &Arc<CloudInstance>) -> Result<()> {
        if self.is_disposed() {
            return Err(CloudError::Disposed(self.details.source_id.clone()));
        }
        if !instance.advance_to(InstanceStatus::Restarting) {
            tracing::warn!(instance = %instance.name(), status = %instance.status(), "Instance cannot be restarted");
            return Ok(());
        }

        let connector = Arc::clone(&self.connector);
        let target = Arc::clone(instance);
        self.launch("restart", instance.name(), async move {
            match connector.restart_vm(&target).await {
                Ok(()) => {
                    tracing::info!(instance = %target.name(), "Instance restarted");
                    target.compare_and_set_status(InstanceStatus::Restarting, InstanceStatus::Running);
                }
                Err(e) => {
                    tracing::warn!(instance = %target.name(), "Failed to restart instance: {}", e);
                    target.fail(&e);
                }
            }
        });
        Ok(())
    }

    /// Stop or delete an instance depending on the clone behaviour.
    /// Instances already stopped or on their way there are left alone.
    pub fn terminate_instance(&self, instance: &Arc<CloudInstance>) -> Result<()> {
        if self.is_disposed() {
            return Err(CloudError::Disposed(self.details.source_id.clone()));
        }

        match instance.status() {
            InstanceStatus::Stopped | InstanceStatus::ScheduledToStop | InstanceStatus::Stopping => {
                tracing::debug!(instance = %instance.name(), "Instance is already stopping");
                return Ok(());
            }
            InstanceStatus::Error => {
                self.discard_failed(instance);
                return Ok(());
            }
            _ => {}
        }
        if !instance.advance_to(InstanceStatus::ScheduledToStop) {
            return Ok(());
        }

        let connector = Arc::clone(&self.connector);
        let delete = self.details.behaviour.delete_after_stop();
        let target = Arc::clone(instance);
        self.launch("terminate", instance.name(), async move {
            let result = if delete {
                connector.delete_vm(&target).await
            } else {
                connector.stop_vm(&target).await
            };
            match result {
                Ok(()) => {
                    tracing::info!(instance = %target.name(), deleted = delete, "Instance stopped");
                    target.advance_to(InstanceStatus::Stopped);
                }
                Err(e) => {
                    tracing::warn!(instance = %target.name(), "Failed to terminate instance: {}", e);
                    target.fail(&e);
                }
            }
        });
        Ok(())
    }

    /// Delete whatever the provider still holds for a failed instance, then forget it
    fn discard_failed(&self, instance: &Arc<CloudInstance>) {
        let connector = Arc::clone(&self.connector);
        let instances = Arc::clone(&self.instances);
        let target = Arc::clone(instance);
        self.launch("discard", instance.name(), async move {
            compensate(connector.as_ref(), &target).await;
            instances.lock().remove(&target.name().to_lowercase());
        });
    }

    /// Drop an instance from the owned set without touching the provider
    pub fn forget_instance(&self, name: &str) -> Option<Arc<CloudInstance>> {
        let removed = self.instances.lock().remove(&name.to_lowercase());
        if removed.is_some() {
            tracing::info!(image = %self.details.source_id, instance = %name, "Forgot instance");
        }
        removed
    }

    /// Apply one reconciliation result for this image
    pub fn apply_observed(&self, observed: &HashMap<String, ObservedInstance>) {
        let seen: HashSet<String> = observed.keys().map(|k| k.to_lowercase()).collect();
        let mut instances = self.instances.lock();

        for (name, record) in observed {
            match instances.get(&name.to_lowercase()) {
                Some(instance) => instance.apply_observed(record),
                None => {
                    tracing::info!(image = %self.details.source_id, instance = %name, status = %record.status, "Adopting instance");
                    let adopted = CloudInstance::from_observed(&self.details.source_id, record);
                    instances.insert(name.to_lowercase(), Arc::new(adopted));
                }
            }
        }

        instances.retain(|key, instance| {
            if seen.contains(key) {
                return true;
            }
            match instance.status() {
                InstanceStatus::Stopped => false,
                InstanceStatus::Running | InstanceStatus::Restarting => {
                    tracing::info!(instance = %instance.name(), "Instance disappeared from the provider");
                    instance.advance_to(InstanceStatus::Stopped);
                    true
                }
                _ => true,
            }
        });
    }

    /// Delete an instance the provider reports as stopped; failures are only logged
    pub fn delete_stopped(&self, observed: &ObservedInstance) {
        if self.is_disposed() {
            return;
        }
        let target = self
            .find_instance(&observed.name)
            .unwrap_or_else(|| Arc::new(CloudInstance::from_observed(&self.details.source_id, observed)));
        let connector = Arc::clone(&self.connector);
        self.launch("delete stopped", &observed.name, async move {
            match connector.delete_vm(&target).await {
                Ok(()) => tracing::info!(instance = %target.name(), "Deleted stopped instance"),
                Err(e) => tracing::warn!(instance = %target.name(), "Failed to delete stopped instance: {}", e),
            }
        });
    }

    /// Validation problems that would prevent new instances
    pub async fn check(&self) -> Vec<String> {
        self.handler.check_image(&self.details).await
    }

    /// Wait until every workflow started so far has finished
    pub async fn wait_for_workflows(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Cancel every outstanding workflow without waiting for it
    pub fn dispose(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(image = %self.details.source_id, "Disposing image");
            self.cancel.cancel();
        }
    }

    fn next_name(&self, instances: &HashMap<String, Arc<CloudInstance>>) -> Result<String> {
        // provider instance names are lowercase
        let prefix = self.details.source_id.to_lowercase();
        if self.details.growing_id {
            loop {
                let name = format!("{}{}", prefix, self.id_provider.next_id()?);
                if !instances.contains_key(&name.to_lowercase()) {
                    return Ok(name);
                }
            }
        }
        let mut n: u64 = 1;
        loop {
            let name = format!("{}{}", prefix, n);
            if !instances.contains_key(&name.to_lowercase()) {
                return Ok(name);
            }
            n += 1;
        }
    }

    fn launch<F>(&self, workflow: &'static str, instance: &str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.cancel.clone();
        let instance = instance.to_string();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(instance = %instance, "{} workflow cancelled", workflow);
                }
                _ = fut => {}
            }
        });
    }
}

fn active_count(instances: &HashMap<String, Arc<CloudInstance>>) -> usize {
    instances
        .values()
        .filter(|i| i.status().is_starting_or_started())
        .count()
}

/// Best-effort removal of provider resources left by a failed create
async fn compensate(connector: &dyn CloudConnector, instance: &CloudInstance) {
    match connector.delete_vm(instance).await {
        Ok(()) => tracing::info!(instance = %instance.name(), "Removed leftovers of failed instance"),
        Err(e) if e.is_not_found() => {
            tracing::debug!(instance = %instance.name(), "Nothing to clean up");
        }
        Err(e) => {
            tracing::warn!(instance = %instance.name(), "Failed to clean up after failed create: {}", e);
        }
    }
}
