use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ProfileSettings;
use crate::connector::{CloudConnector, ConnectorSettings, YandexConnector};
use crate::error::{CloudError, Result};
use crate::image::{CloudImage, FileIdProvider, IdProvider, ImageDetails};

/// One cloud profile: a connector plus the images declared on it
pub struct CloudClient {
    connector: Arc<dyn CloudConnector>,
    images: Vec<Arc<CloudImage>>,
    cancel: CancellationToken,
}

impl CloudClient {
    pub fn new(
        connector: Arc<dyn CloudConnector>,
        details: Vec<ImageDetails>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for d in &details {
            if !seen.insert(d.source_id.to_lowercase()) {
                return Err(CloudError::Configuration(format!("Duplicate image source id {}", d.source_id)));
            }
        }

        let images = details
            .into_iter()
            .map(|d| Arc::new(CloudImage::new(d, Arc::clone(&connector), Arc::clone(&id_provider))))
            .collect();

        Ok(Self {
            connector,
            images,
            cancel: CancellationToken::new(),
        })
    }

    /// Build the profile from environment settings
    pub async fn connect(settings: &ProfileSettings) -> Result<Self> {
        let connector = YandexConnector::connect(ConnectorSettings {
            access_key: settings.access_key.clone(),
            api_endpoint: settings.api_endpoint.clone(),
            server_id: settings.server_id.clone(),
            profile_id: settings.profile_id.clone(),
        })
        .await?;

        let details = match &settings.images_file {
            Some(path) => ImageDetails::load_file(path)?,
            None => Vec::new(),
        };
        let id_provider = Arc::new(FileIdProvider::new(settings.growing_id_file()));
        Self::new(Arc::new(connector), details, id_provider)
    }

    pub fn connector(&self) -> &Arc<dyn CloudConnector> {
        &self.connector
    }

    pub fn images(&self) -> &[Arc<CloudImage>] {
        &self.images
    }

    pub fn find_image(&self, source_id: &str) -> Option<Arc<CloudImage>> {
        self.images
            .iter()
            .find(|image| image.source_id().eq_ignore_ascii_case(source_id))
            .cloned()
    }

    /// One reconciliation sweep over every image
    pub async fn update_instances(&self) -> Result<()> {
        let observed = self.connector.fetch_instances(&self.images).await?;
        for image in &self.images {
            let records = observed.get(image.source_id()).cloned().unwrap_or_default();
            image.apply_observed(&records);
        }
        Ok(())
    }

    /// Reconcile every `interval` until the client is disposed
    pub fn spawn_updater(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let client = Arc::clone(self);
        let token = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = client.update_instances().await {
                            tracing::warn!("Failed to update instances: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("Instance updater stopped");
        })
    }

    pub fn dispose(&self) {
        self.cancel.cancel();
        for image in &self.images {
            image.dispose();
        }
    }
}
