use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{PROP_COMPUTE_ID, PROP_FOLDER_ID, PROP_ZONE};
use crate::models::{InstanceStatus, ProviderInstance};

/// What reconciliation saw for one of our instances on the provider side
#[derive(Serialize, Clone, Debug)]
pub struct ObservedInstance {
    pub name: String,
    pub zone: String,
    pub compute_id: String,
    pub folder_id: String,
    pub provider_status: String,
    pub status: InstanceStatus,
    pub ip_address: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub properties: BTreeMap<String, String>,
}

impl ObservedInstance {
    pub fn from_provider(instance: &ProviderInstance) -> Self {
        let mut properties: BTreeMap<String, String> = instance
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        properties.insert(PROP_ZONE.to_string(), instance.zone_id.clone());
        properties.insert(PROP_COMPUTE_ID.to_string(), instance.id.clone());
        properties.insert(PROP_FOLDER_ID.to_string(), instance.folder_id.clone());

        let created_at = instance
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        Self {
            name: instance.name.clone(),
            zone: instance.zone_id.clone(),
            compute_id: instance.id.clone(),
            folder_id: instance.folder_id.clone(),
            provider_status: instance.status.clone(),
            status: InstanceStatus::from_provider(&instance.status),
            ip_address: instance.ip_address(),
            created_at,
            properties,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.provider_status.eq_ignore_ascii_case("STOPPED")
    }
}
