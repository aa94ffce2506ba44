use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CloudError, Result};

/// Bootstrap data handed to the guest agent so it can register itself
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentUserData {
    pub agent_name: String,
    pub auth_token: String,
    pub server_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
    pub profile_id: String,
    #[serde(default)]
    pub profile_description: String,
    #[serde(default)]
    pub custom_params: BTreeMap<String, String>,
}

impl AgentUserData {
    pub fn new(server_address: impl Into<String>, auth_token: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            auth_token: auth_token.into(),
            profile_id: profile_id.into(),
            ..Default::default()
        }
    }

    /// Copy of this data addressed to a specific machine
    pub fn with_agent_name(&self, name: &str) -> Self {
        Self {
            agent_name: name.to_string(),
            ..self.clone()
        }
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.custom_params.insert(k.into(), v.into());
        }
        self
    }

    /// Encoded form stored in the instance metadata
    pub fn serialize(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    pub fn deserialize(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CloudError::MalformedResponse(format!("Invalid user data encoding: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
