use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use yc_agents::image::CloneBehaviour;
use yc_agents::models::{AgentUserData, InstanceStatus, LookupEntry, ObservedInstance, SourceImage};
use yc_agents::utils::GIB;
use yc_agents::{CloudClient, CloudConnector, CloudError, CloudImage, CloudInstance, FileIdProvider, ImageDetails, Result};

#[derive(Default)]
struct FakeConnector {
    calls: Mutex<Vec<String>>,
    fail_create: AtomicBool,
    fail_restart: AtomicBool,
    create_delay_ms: AtomicU64,
    observed: Mutex<HashMap<String, HashMap<String, ObservedInstance>>>,
}

impl FakeConnector {
    fn record(&self, call: &str, instance: &CloudInstance) {
        self.calls.lock().push(format!("{}:{}", call, instance.name()));
    }

    fn count(&self, call: &str) -> usize {
        let prefix = format!("{}:", call);
        self.calls.lock().iter().filter(|c| c.starts_with(&prefix)).count()
    }
}

#[async_trait]
impl CloudConnector for FakeConnector {
    async fn create_instance(
        &self,
        _details: &ImageDetails,
        source_image: &SourceImage,
        instance: &CloudInstance,
        _user_data: &AgentUserData,
    ) -> Result<()> {
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.calls.lock().push(format!("create:{}:{}", instance.name(), source_image.id));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(CloudError::ProviderUnavailable("compute is down".to_string()));
        }
        instance.set_compute_id(&format!("c-{}", instance.name()));
        Ok(())
    }

    async fn start_vm(&self, instance: &CloudInstance) -> Result<()> {
        self.record("start", instance);
        Ok(())
    }

    async fn stop_vm(&self, instance: &CloudInstance) -> Result<()> {
        self.record("stop", instance);
        Ok(())
    }

    async fn restart_vm(&self, instance: &CloudInstance) -> Result<()> {
        self.record("restart", instance);
        if self.fail_restart.load(Ordering::SeqCst) {
            return Err(CloudError::ProviderRejected {
                status: 409,
                message: "busy".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_vm(&self, instance: &CloudInstance) -> Result<()> {
        self.record("delete", instance);
        match instance.compute_id() {
            Some(_) => Ok(()),
            None => Err(CloudError::not_found(format!("{} does not exist", instance.name()))),
        }
    }

    async fn check_access(&self) -> Result<()> {
        Ok(())
    }

    async fn resolve_image(&self, image_id: &str) -> Result<Option<SourceImage>> {
        self.calls.lock().push(format!("resolve:{}", image_id));
        if image_id == "missing" {
            return Ok(None);
        }
        Ok(Some(SourceImage {
            id: image_id.to_string(),
            name: "ubuntu".to_string(),
            description: String::new(),
            min_disk_size: 10 * GIB,
        }))
    }

    async fn list_images(&self) -> Result<Vec<LookupEntry>> {
        Ok(Vec::new())
    }

    async fn list_zones(&self) -> Result<Vec<LookupEntry>> {
        Ok(Vec::new())
    }

    async fn list_networks(&self) -> Result<Vec<LookupEntry>> {
        Ok(Vec::new())
    }

    async fn list_subnets(&self) -> Result<Vec<LookupEntry>> {
        Ok(Vec::new())
    }

    async fn list_disk_types(&self) -> Result<Vec<LookupEntry>> {
        Ok(Vec::new())
    }

    async fn fetch_instances(&self, _images: &[Arc<CloudImage>]) -> Result<HashMap<String, HashMap<String, ObservedInstance>>> {
        Ok(self.observed.lock().clone())
    }
}

fn details(max_instances: usize) -> ImageDetails {
    ImageDetails {
        source_id: "agent-".to_string(),
        source_image: "fd8img".to_string(),
        zone: "ru-central1-a".to_string(),
        subnet: "e9bsub".to_string(),
        machine_cores: 2,
        machine_memory: 2 * GIB,
        max_instances,
        ..Default::default()
    }
}

fn image_with(details: ImageDetails, connector: &Arc<FakeConnector>, ids: &tempfile::TempDir) -> CloudImage {
    let connector: Arc<dyn CloudConnector> = connector.clone();
    let provider = Arc::new(FileIdProvider::new(ids.path().join("growing-id")));
    CloudImage::new(details, connector, provider)
}

fn user_data() -> AgentUserData {
    AgentUserData::new("https://ci.example.com", "token", "profile-1")
}

fn observed(name: &str, status: InstanceStatus) -> ObservedInstance {
    ObservedInstance {
        name: name.to_string(),
        zone: "ru-central1-a".to_string(),
        compute_id: format!("c-{}", name),
        folder_id: "folder".to_string(),
        provider_status: status.as_str().to_uppercase(),
        status,
        ip_address: None,
        created_at: None,
        properties: BTreeMap::new(),
    }
}

async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn running_instance(image: &CloudImage) -> Arc<CloudInstance> {
    let instance = image.start_new_instance(&user_data()).unwrap();
    let probe = Arc::clone(&instance);
    eventually(move || probe.status() == InstanceStatus::Running).await;
    instance
}

#[tokio::test]
async fn test_quota_is_checked_before_scheduling() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let image = image_with(details(1), &connector, &ids);

    assert!(image.can_start_new_instance());
    let first = image.start_new_instance(&user_data()).unwrap();
    assert_eq!(first.name(), "agent-1");
    assert!(!image.can_start_new_instance());

    let second = image.start_new_instance(&user_data());
    assert!(matches!(second, Err(CloudError::QuotaExceeded(_))));
    assert_eq!(image.instances().len(), 1);
}

#[tokio::test]
async fn test_zero_quota_refuses_everything() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let image = image_with(details(0), &connector, &ids);
    assert!(!image.can_start_new_instance());
    assert!(matches!(
        image.start_new_instance(&user_data()),
        Err(CloudError::QuotaExceeded(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_get_distinct_names() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let image = Arc::new(image_with(details(10), &connector, &ids));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let image = Arc::clone(&image);
            tokio::spawn(async move { image.start_new_instance(&user_data()).unwrap().name().to_string() })
        })
        .collect();

    let mut names = HashSet::new();
    for handle in handles {
        names.insert(handle.await.unwrap().to_lowercase());
    }
    assert_eq!(names.len(), 10);
    assert!(names.contains("agent-1") && names.contains("agent-10"));
}

#[tokio::test]
async fn test_linear_probe_reuses_freed_names() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let image = image_with(details(3), &connector, &ids);

    image.start_new_instance(&user_data()).unwrap();
    image.start_new_instance(&user_data()).unwrap();
    image.forget_instance("AGENT-1");
    let third = image.start_new_instance(&user_data()).unwrap();
    assert_eq!(third.name(), "agent-1");
}

#[tokio::test]
async fn test_growing_id_survives_restart() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let mut growing = details(5);
    growing.growing_id = true;

    let before = image_with(growing.clone(), &connector, &ids);
    assert_eq!(before.start_new_instance(&user_data()).unwrap().name(), "agent-1");
    assert_eq!(before.start_new_instance(&user_data()).unwrap().name(), "agent-2");
    before.dispose();

    let after = image_with(growing, &connector, &ids);
    assert_eq!(after.start_new_instance(&user_data()).unwrap().name(), "agent-3");
}

#[tokio::test]
async fn test_successful_create_reaches_running() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let image = image_with(details(1), &connector, &ids);

    let instance = running_instance(&image).await;
    assert_eq!(instance.compute_id().as_deref(), Some("c-agent-1"));
    assert!(instance.error().is_none());
    assert_eq!(connector.count("create"), 1);
}

#[tokio::test]
async fn test_failed_create_is_recorded_and_compensated() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    connector.fail_create.store(true, Ordering::SeqCst);
    let image = image_with(details(1), &connector, &ids);

    let instance = image.start_new_instance(&user_data()).unwrap();
    let probe = Arc::clone(&instance);
    eventually(move || probe.status() == InstanceStatus::Error).await;

    let error = instance.error().unwrap();
    assert!(error.message.contains("compute is down"));
    let c = Arc::clone(&connector);
    eventually(move || c.count("delete") == 1).await;
    // stays visible until removed
    assert!(image.find_instance("agent-1").is_some());
    assert!(image.can_start_new_instance());
}

#[tokio::test]
async fn test_create_resolves_source_image_once() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let image = image_with(details(1), &connector, &ids);

    running_instance(&image).await;
    assert_eq!(connector.count("resolve"), 1);
    assert!(connector.calls.lock().contains(&"create:agent-1:fd8img".to_string()));
}

#[tokio::test]
async fn test_names_use_lowercased_source_id() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let mut upper = details(2);
    upper.source_id = "Agent-".to_string();
    let image = image_with(upper.clone(), &connector, &ids);
    assert_eq!(image.start_new_instance(&user_data()).unwrap().name(), "agent-1");

    upper.growing_id = true;
    let growing = image_with(upper, &connector, &ids);
    assert_eq!(growing.start_new_instance(&user_data()).unwrap().name(), "agent-1");
}

#[tokio::test]
async fn test_terminate_during_create_deletes_the_late_machine() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    connector.create_delay_ms.store(200, Ordering::SeqCst);
    let image = image_with(details(1), &connector, &ids);

    let instance = image.start_new_instance(&user_data()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    image.terminate_instance(&instance).unwrap();
    image.wait_for_workflows().await;

    assert_eq!(instance.compute_id().as_deref(), Some("c-agent-1"));
    assert_eq!(connector.count("create"), 1);
    // the early delete misses, the one after the create lands
    assert_eq!(connector.count("delete"), 2);
    let last = connector.calls.lock().last().cloned();
    assert_eq!(last.as_deref(), Some("delete:agent-1"));
    assert!(!instance.status().is_starting_or_started());
}

#[tokio::test]
async fn test_wait_for_workflows_outlasts_slow_create() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    connector.create_delay_ms.store(300, Ordering::SeqCst);
    let image = image_with(details(1), &connector, &ids);

    let instance = image.start_new_instance(&user_data()).unwrap();
    image.wait_for_workflows().await;
    assert_eq!(instance.status(), InstanceStatus::Running);
    assert_eq!(connector.count("create"), 1);

    // the image keeps accepting work afterwards
    image.terminate_instance(&instance).unwrap();
    image.wait_for_workflows().await;
    assert_eq!(instance.status(), InstanceStatus::Stopped);
}

#[tokio::test]
async fn test_validation_errors_are_aggregated() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let mut broken = details(1);
    broken.source_image = "missing".to_string();
    broken.machine_cores = 1;
    broken.machine_memory = 0;
    let image = image_with(broken, &connector, &ids);

    let problems = image.check().await;
    assert_eq!(problems.len(), 3);

    let instance = image.start_new_instance(&user_data()).unwrap();
    let probe = Arc::clone(&instance);
    eventually(move || probe.status() == InstanceStatus::Error).await;
    assert!(instance.error().unwrap().message.starts_with("Image validation failed"));
    assert_eq!(connector.count("create"), 0);
}

#[tokio::test]
async fn test_terminate_twice_calls_provider_once() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let image = image_with(details(1), &connector, &ids);
    let instance = running_instance(&image).await;

    image.terminate_instance(&instance).unwrap();
    let probe = Arc::clone(&instance);
    eventually(move || probe.status() == InstanceStatus::Stopped).await;
    assert_eq!(connector.count("delete"), 1);

    image.terminate_instance(&instance).unwrap();
    image.terminate_instance(&instance).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.count("delete"), 1);
    assert_eq!(instance.status(), InstanceStatus::Stopped);
    assert!(image.find_instance("agent-1").is_some());
}

#[tokio::test]
async fn test_start_stop_behaviour_only_stops() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let mut keep = details(1);
    keep.behaviour = CloneBehaviour::StartStop;
    let image = image_with(keep, &connector, &ids);
    let instance = running_instance(&image).await;

    image.terminate_instance(&instance).unwrap();
    let probe = Arc::clone(&instance);
    eventually(move || probe.status() == InstanceStatus::Stopped).await;
    assert_eq!(connector.count("stop"), 1);
    assert_eq!(connector.count("delete"), 0);
}

#[tokio::test]
async fn test_terminating_failed_instance_discards_it() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    connector.fail_create.store(true, Ordering::SeqCst);
    let image = image_with(details(1), &connector, &ids);

    let instance = image.start_new_instance(&user_data()).unwrap();
    let probe = Arc::clone(&instance);
    eventually(move || probe.status() == InstanceStatus::Error).await;

    image.terminate_instance(&instance).unwrap();
    eventually(|| image.find_instance("agent-1").is_none()).await;
}

#[tokio::test]
async fn test_restart_returns_to_running() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let image = image_with(details(1), &connector, &ids);
    let instance = running_instance(&image).await;

    image.restart_instance(&instance).unwrap();
    let probe = Arc::clone(&instance);
    eventually(move || probe.status() == InstanceStatus::Running).await;
    assert_eq!(connector.count("restart"), 1);
}

#[tokio::test]
async fn test_failed_restart_records_error() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    connector.fail_restart.store(true, Ordering::SeqCst);
    let image = image_with(details(1), &connector, &ids);
    let instance = running_instance(&image).await;

    image.restart_instance(&instance).unwrap();
    let probe = Arc::clone(&instance);
    eventually(move || probe.status() == InstanceStatus::Error).await;
    assert!(instance.error().unwrap().message.contains("busy"));
    assert_eq!(connector.count("restart"), 1);
}

#[tokio::test]
async fn test_apply_observed_adopts_promotes_and_cleans_up() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    connector.create_delay_ms.store(30_000, Ordering::SeqCst);
    let image = image_with(details(5), &connector, &ids);

    let pending = image.start_new_instance(&user_data()).unwrap();
    assert!(pending.compare_and_set_status(InstanceStatus::ScheduledToStart, InstanceStatus::Starting));

    let mut seed = HashMap::new();
    seed.insert("agent-9".to_string(), observed("agent-9", InstanceStatus::Running));
    seed.insert("agent-8".to_string(), observed("agent-8", InstanceStatus::Stopped));
    image.apply_observed(&seed);
    let adopted_running = image.find_instance("agent-9").unwrap();
    assert_eq!(adopted_running.status(), InstanceStatus::Running);
    assert_eq!(image.find_instance("agent-8").unwrap().status(), InstanceStatus::Stopped);

    let mut sweep = HashMap::new();
    sweep.insert("agent-1".to_string(), observed("agent-1", InstanceStatus::Running));
    sweep.insert("agent-5".to_string(), observed("agent-5", InstanceStatus::Starting));
    image.apply_observed(&sweep);

    assert_eq!(pending.status(), InstanceStatus::Running);
    assert_eq!(pending.compute_id().as_deref(), Some("c-agent-1"));
    assert_eq!(image.find_instance("agent-5").unwrap().status(), InstanceStatus::Starting);
    assert_eq!(adopted_running.status(), InstanceStatus::Stopped);
    assert!(image.find_instance("agent-8").is_none());
    image.dispose();
}

#[tokio::test]
async fn test_delete_stopped_routes_through_connector() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    let image = image_with(details(1), &connector, &ids);

    image.delete_stopped(&observed("agent-4", InstanceStatus::Stopped));
    let c = Arc::clone(&connector);
    eventually(move || c.count("delete") == 1).await;
}

#[tokio::test]
async fn test_dispose_cancels_workflows_and_refuses_work() {
    let ids = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::default());
    connector.create_delay_ms.store(30_000, Ordering::SeqCst);
    let image = image_with(details(2), &connector, &ids);

    let instance = image.start_new_instance(&user_data()).unwrap();
    image.dispose();
    let probe = Arc::clone(&instance);
    eventually(move || probe.status() == InstanceStatus::Error).await;

    assert!(instance.error().unwrap().message.contains("disposed"));
    assert_eq!(connector.count("create"), 0);
    let c = Arc::clone(&connector);
    eventually(move || c.count("delete") == 1).await;
    assert!(matches!(
        image.start_new_instance(&user_data()),
        Err(CloudError::Disposed(_))
    ));
    assert!(matches!(image.terminate_instance(&instance), Err(CloudError::Disposed(_))));
}

#[tokio::test]
async fn test_client_rejects_duplicate_source_ids() {
    let ids = tempfile::tempdir().unwrap();
    let connector: Arc<dyn CloudConnector> = Arc::new(FakeConnector::default());
    let provider = Arc::new(FileIdProvider::new(ids.path().join("growing-id")));
    let mut twin = details(1);
    twin.source_id = "AGENT-".to_string();

    let result = CloudClient::new(connector, vec![details(1), twin], provider);
    assert!(matches!(result, Err(CloudError::Configuration(_))));
}

#[tokio::test]
async fn test_client_update_applies_reconciliation() {
    let ids = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeConnector::default());
    let mut per_image = HashMap::new();
    per_image.insert("agent-3".to_string(), observed("agent-3", InstanceStatus::Running));
    fake.observed.lock().insert("agent-".to_string(), per_image);

    let connector: Arc<dyn CloudConnector> = fake.clone();
    let provider = Arc::new(FileIdProvider::new(ids.path().join("growing-id")));
    let mut other = details(1);
    other.source_id = "big-".to_string();
    let client = Arc::new(CloudClient::new(connector, vec![details(2), other], provider).unwrap());

    client.update_instances().await.unwrap();
    let image = client.find_image("agent-").unwrap();
    assert_eq!(image.find_instance("agent-3").unwrap().status(), InstanceStatus::Running);
    assert!(client.find_image("big-").unwrap().instances().is_empty());

    let updater = client.spawn_updater(Duration::from_millis(10));
    client.dispose();
    updater.await.unwrap();
    assert!(image.is_disposed());
}
