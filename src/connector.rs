use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::api::instances::{self, InstanceAction};
use crate::api::{access, catalog, ApiClient};
use crate::config::{TAG_DATA, TAG_PROFILE, TAG_SERVER, TAG_SOURCE};
use crate::error::{CloudError, Result};
use crate::image::{CloudImage, CloudInstance, ImageDetails};
use crate::models::{AgentUserData, LookupEntry, ObservedInstance, ProviderInstance, ServiceAccountKey, SourceImage};
use crate::services::{build_create_request, CreateContext};

/// Full-view instance fetches in flight at once during reconciliation
const FETCH_CONCURRENCY: usize = 16;

/// Provider operations the image orchestrator depends on
#[async_trait]
pub trait CloudConnector: Send + Sync {
    /// Create the machine for `instance` from an already resolved source image and record its compute id
    async fn create_instance(
        &self,
        details: &ImageDetails,
        source_image: &SourceImage,
        instance: &CloudInstance,
        user_data: &AgentUserData,
    ) -> Result<()>;
    async fn start_vm(&self, instance: &CloudInstance) -> Result<()>;
    async fn stop_vm(&self, instance: &CloudInstance) -> Result<()>;
    async fn restart_vm(&self, instance: &CloudInstance) -> Result<()>;
    async fn delete_vm(&self, instance: &CloudInstance) -> Result<()>;
    async fn check_access(&self) -> Result<()>;
    async fn resolve_image(&self, image_id: &str) -> Result<Option<SourceImage>>;
    async fn list_images(&self) -> Result<Vec<LookupEntry>>;
    async fn list_zones(&self) -> Result<Vec<LookupEntry>>;
    async fn list_networks(&self) -> Result<Vec<LookupEntry>>;
    async fn list_subnets(&self) -> Result<Vec<LookupEntry>>;
    async fn list_disk_types(&self) -> Result<Vec<LookupEntry>>;
    /// Our instances per image source id, keyed by instance name
    async fn fetch_instances(&self, images: &[Arc<CloudImage>]) -> Result<HashMap<String, HashMap<String, ObservedInstance>>>;
}

#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub access_key: String,
    pub api_endpoint: String,
    pub server_id: String,
    pub profile_id: String,
}

/// Connector backed by the Yandex Cloud REST gateway
pub struct YandexConnector {
    api: ApiClient,
    service_account_id: String,
    folder_id: String,
    server_id: String,
    profile_id: String,
}

impl YandexConnector {
    /// Parse the credentials and resolve the service account's folder
    pub async fn connect(settings: ConnectorSettings) -> Result<Self> {
        let key = ServiceAccountKey::parse(&settings.access_key)?;
        let service_account_id = key.service_account_id.clone();
        let api = ApiClient::new(&settings.api_endpoint, key)?;
        let folder_id = access::get_service_account_folder(&api, &service_account_id).await?;
        tracing::info!(service_account = %service_account_id, folder = %folder_id, "Connected to Yandex Cloud");
        Ok(Self {
            api,
            service_account_id,
            folder_id,
            server_id: settings.server_id,
            profile_id: settings.profile_id,
        })
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    /// Compute id of an instance, looking it up by name when creation was never acknowledged
    async fn compute_id(&self, instance: &CloudInstance) -> Result<String> {
        if let Some(id) = instance.compute_id() {
            return Ok(id);
        }
        let folder = instance.folder_id().unwrap_or_else(|| self.folder_id.clone());
        match instances::find_instance_by_name(&self.api, &folder, instance.name()).await? {
            Some(found) => {
                instance.set_compute_id(&found.id);
                Ok(found.id)
            }
            None => Err(CloudError::not_found(format!(
                "Instance {} not found in folder {}",
                instance.name(),
                folder
            ))),
        }
    }

    async fn vm_action(&self, instance: &CloudInstance, action: InstanceAction) -> Result<()> {
        let compute_id = self.compute_id(instance).await?;
        let op = instances::instance_action(&self.api, &compute_id, action).await?;
        tracing::debug!(instance = %instance.name(), operation = %op.id, "Requested {}", action.as_str());
        Ok(())
    }

    /// Whether a provider instance carries this server's and profile's ownership tags
    fn is_ours(&self, instance: &ProviderInstance) -> bool {
        instance.tag(TAG_SERVER) == Some(self.server_id.as_str())
            && instance.tag(TAG_PROFILE) == Some(self.profile_id.as_str())
            && instance.tag(TAG_DATA).is_some_and(|d| !d.trim().is_empty())
    }
}

#[async_trait]
impl CloudConnector for YandexConnector {
    async fn create_instance(
        &self,
        details: &ImageDetails,
        source_image: &SourceImage,
        instance: &CloudInstance,
        user_data: &AgentUserData,
    ) -> Result<()> {
        let request = build_create_request(&CreateContext {
            details,
            source_image,
            instance_name: instance.name(),
            default_folder_id: &self.folder_id,
            server_id: &self.server_id,
            profile_id: &self.profile_id,
            user_data,
        })?;
        instance.set_folder_id(&request.folder_id);

        let op = instances::create_instance(&self.api, &request).await?;
        match op.instance_id() {
            Some(id) => instance.set_compute_id(&id),
            None => tracing::warn!(instance = %instance.name(), operation = %op.id, "Create operation did not report an instance id"),
        }
        Ok(())
    }

    async fn start_vm(&self, instance: &CloudInstance) -> Result<()> {
        self.vm_action(instance, InstanceAction::Start).await
    }

    async fn stop_vm(&self, instance: &CloudInstance) -> Result<()> {
        self.vm_action(instance, InstanceAction::Stop).await
    }

    async fn restart_vm(&self, instance: &CloudInstance) -> Result<()> {
        self.vm_action(instance, InstanceAction::Restart).await
    }

    async fn delete_vm(&self, instance: &CloudInstance) -> Result<()> {
        let compute_id = self.compute_id(instance).await?;
        let op = instances::delete_instance(&self.api, &compute_id).await?;
        tracing::debug!(instance = %instance.name(), operation = %op.id, "Requested delete");
        Ok(())
    }

    async fn check_access(&self) -> Result<()> {
        access::check_access(&self.api, &self.service_account_id, &self.folder_id).await
    }

    async fn resolve_image(&self, image_id: &str) -> Result<Option<SourceImage>> {
        catalog::get_image(&self.api, image_id).await
    }

    async fn list_images(&self) -> Result<Vec<LookupEntry>> {
        catalog::list_images(&self.api, &self.folder_id).await
    }

    async fn list_zones(&self) -> Result<Vec<LookupEntry>> {
        catalog::list_zones(&self.api).await
    }

    async fn list_networks(&self) -> Result<Vec<LookupEntry>> {
        catalog::list_networks(&self.api, &self.folder_id).await
    }

    async fn list_subnets(&self) -> Result<Vec<LookupEntry>> {
        catalog::list_subnets(&self.api, &self.folder_id).await
    }

    async fn list_disk_types(&self) -> Result<Vec<LookupEntry>> {
        catalog::list_disk_types(&self.api).await
    }

    async fn fetch_instances(&self, images: &[Arc<CloudImage>]) -> Result<HashMap<String, HashMap<String, ObservedInstance>>> {
        let mut result: HashMap<String, HashMap<String, ObservedInstance>> = images
            .iter()
            .map(|image| (image.source_id().to_string(), HashMap::new()))
            .collect();

        let mut by_folder: BTreeMap<String, Vec<&Arc<CloudImage>>> = BTreeMap::new();
        for image in images {
            let folder = image.details().effective_folder(&self.folder_id).to_string();
            by_folder.entry(folder).or_default().push(image);
        }

        for (folder, folder_images) in by_folder {
            let listed = instances::list_instances(&self.api, &folder).await?;
            let fetched: Vec<Result<ProviderInstance>> = stream::iter(listed.iter().map(|summary| summary.id.clone()).collect::<Vec<String>>())
                .map(|id| async move { instances::get_instance(&self.api, &id).await })
                .buffered(FETCH_CONCURRENCY)
                .collect()
                .await;

            for (summary, full) in listed.iter().zip(fetched) {
                let full = match full {
                    Ok(full) => full,
                    Err(e) if e.is_not_found() => {
                        tracing::debug!(instance = %summary.name, "Instance vanished during reconciliation");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if !self.is_ours(&full) {
                    continue;
                }
                let Some(source_id) = full.tag(TAG_SOURCE) else {
                    continue;
                };
                let Some(image) = folder_images.iter().find(|image| image.source_id() == source_id) else {
                    continue;
                };

                let observed = ObservedInstance::from_provider(&full);
                if observed.is_stopped() {
                    tracing::info!(instance = %observed.name, "Scheduling deletion of stopped instance");
                    image.delete_stopped(&observed);
                }
                result
                    .entry(source_id.to_string())
                    .or_default()
                    .insert(observed.name.clone(), observed);
            }
        }

        Ok(result)
    }
}
