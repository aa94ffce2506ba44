use serde::Deserialize;
use serde_json::Value;

use crate::error::{CloudError, Result};

/// Long-running operation returned by mutating compute calls
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct OperationError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl Operation {
    /// Compute id of the instance the operation acts on
    pub fn instance_id(&self) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("instanceId"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    }

    /// Fail if the operation already finished with an error
    pub fn check(self) -> Result<Self> {
        match (&self.error, self.done) {
            (Some(err), true) => Err(CloudError::ProviderRejected {
                status: 400,
                message: format!("Operation {} failed (code {}): {}", self.id, err.code, err.message),
            }),
            _ => Ok(self),
        }
    }
}
