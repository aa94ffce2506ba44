use serde::Deserialize;

use crate::error::{CloudError, Result};

/// Authorized key of a service account, as downloaded from the console
#[derive(Deserialize, Clone)]
pub struct ServiceAccountKey {
    pub service_account_id: String,
    #[serde(rename = "id")]
    pub key_id: String,
    pub private_key: String,
}

impl ServiceAccountKey {
    /// Parse the credential secret. Escaped newlines in the PEM are normalized.
    pub fn parse(secret: &str) -> Result<Self> {
        let mut key: ServiceAccountKey = serde_json::from_str(secret.trim())
            .map_err(|e| CloudError::Configuration(format!("Invalid access key JSON: {}", e)))?;
        key.private_key = key.private_key.replace("\\n", "\n");
        if key.service_account_id.trim().is_empty() || key.key_id.trim().is_empty() {
            return Err(CloudError::Configuration(
                "Access key must contain service_account_id and id".to_string(),
            ));
        }
        Ok(key)
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("service_account_id", &self.service_account_id)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}
