use std::sync::Arc;

use super::{CloudInstance, ImageDetails};
use crate::connector::CloudConnector;
use crate::error::{CloudError, Result};
use crate::models::{AgentUserData, SourceImage};

/// Validates image prerequisites before handing creation to the connector
#[derive(Clone)]
pub struct ImageHandler {
    connector: Arc<dyn CloudConnector>,
}

impl ImageHandler {
    pub fn new(connector: Arc<dyn CloudConnector>) -> Self {
        Self { connector }
    }

    /// Every failed prerequisite, in a stable order. Empty means the image is usable.
    pub async fn check_image(&self, details: &ImageDetails) -> Vec<String> {
        self.inspect(details).await.0
    }

    /// Validate the image, then create the instance from the source image resolved during validation
    pub async fn create_instance(
        &self,
        details: &ImageDetails,
        instance: &CloudInstance,
        user_data: &AgentUserData,
    ) -> Result<()> {
        let (errors, source_image) = self.inspect(details).await;
        if !errors.is_empty() {
            return Err(CloudError::ValidationFailed(errors));
        }
        let source_image = source_image
            .ok_or_else(|| CloudError::not_found(format!("Source image {} not found", details.source_image)))?;
        self.connector
            .create_instance(details, &source_image, instance, user_data)
            .await
    }

    async fn inspect(&self, details: &ImageDetails) -> (Vec<String>, Option<SourceImage>) {
        let mut errors = Vec::new();
        let mut resolved = None;

        if details.source_image.trim().is_empty() {
            errors.push("Source image is not specified".to_string());
        } else {
            match self.connector.resolve_image(&details.source_image).await {
                Ok(Some(image)) => resolved = Some(image),
                Ok(None) => errors.push(format!("Source image {} does not exist", details.source_image)),
                Err(e) => errors.push(format!("Failed to resolve source image {}: {}", details.source_image, e)),
            }
        }

        if details.machine_cores < 2 {
            errors.push(format!("Machine needs at least 2 cores, got {}", details.machine_cores));
        }
        if details.machine_memory <= 0 {
            errors.push("Machine memory must be positive".to_string());
        }

        (errors, resolved)
    }
}
