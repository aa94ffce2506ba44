use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{
    BEHAVIOUR, CLOUD_CONFIG, CUSTOM_PROPS, DEFAULT_MAX_INSTANCES, DEFAULT_MOUNT_PATH, DISK_SIZE, DISK_TYPE,
    DNS_RECORDS, GROWING_ID, HOSTNAME, INSTANCE_FOLDER, IPV6, MACHINE_CORES, MACHINE_MEMORY, MAX_INSTANCES, METADATA,
    NAT, PLATFORM_ID, PREEMPTIBLE, SECONDARY_DISK_MOUNT_PATH, SECONDARY_DISK_SIZE, SECONDARY_DISK_TYPE,
    SECURITY_GROUPS, SERVICE_ACCOUNT, SOURCE_ID, SOURCE_IMAGE, SUBNET, ZONE,
};
use crate::error::{CloudError, Result};
use crate::utils::{non_blank, parse_csv, parse_flag, parse_gib, parse_optional_int, value_to_plain_string};

/// What happens to a machine when its agent is no longer needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloneBehaviour {
    /// Delete the machine; every start creates a new one
    #[default]
    FreshClone,
    /// Stop the machine and keep its disks
    StartStop,
}

impl CloneBehaviour {
    pub fn parse(value: Option<&String>) -> Self {
        match value.map(|v| v.trim().to_uppercase()) {
            Some(v) if v == "START_STOP" => CloneBehaviour::StartStop,
            _ => CloneBehaviour::FreshClone,
        }
    }

    pub fn delete_after_stop(self) -> bool {
        self == CloneBehaviour::FreshClone
    }
}

/// Immutable template every instance of an image is created from.
/// Sizes and memory are in bytes.
#[derive(Debug, Clone, Default)]
pub struct ImageDetails {
    pub source_id: String,
    pub source_image: String,
    pub zone: String,
    pub subnet: String,
    pub ipv6: bool,
    pub nat: bool,
    pub security_groups: Vec<String>,
    pub machine_cores: i64,
    pub machine_memory: i64,
    pub max_instances: usize,
    pub preemptible: bool,
    pub disk_type: Option<String>,
    pub disk_size: i64,
    pub secondary_disk_type: Option<String>,
    pub secondary_disk_size: i64,
    pub secondary_disk_mount_path: String,
    pub metadata: Option<String>,
    pub cloud_config: Option<String>,
    pub dns_records: Option<String>,
    pub hostname: Option<String>,
    pub growing_id: bool,
    pub service_account: Option<String>,
    pub instance_folder: Option<String>,
    pub platform_id: Option<String>,
    pub custom_props: Option<String>,
    pub behaviour: CloneBehaviour,
}

impl ImageDetails {
    /// Build an image from its flat option map. Numeric options that do not
    /// parse are treated as absent.
    pub fn from_params(source_id: &str, params: &HashMap<String, String>) -> Result<Self> {
        let source_id = source_id.trim();
        if source_id.is_empty() {
            return Err(CloudError::Configuration("Image source id is required".to_string()));
        }
        let zone = non_blank(params, ZONE)
            .ok_or_else(|| CloudError::Configuration(format!("Image {}: zone is required", source_id)))?;
        let subnet = non_blank(params, SUBNET)
            .ok_or_else(|| CloudError::Configuration(format!("Image {}: subnet is required", source_id)))?;

        let max_instances = parse_optional_int(params.get(MAX_INSTANCES))
            .map(|v| v.max(0) as usize)
            .unwrap_or(DEFAULT_MAX_INSTANCES);

        Ok(Self {
            source_id: source_id.to_string(),
            source_image: non_blank(params, SOURCE_IMAGE).unwrap_or_default(),
            zone,
            subnet,
            ipv6: parse_flag(params.get(IPV6), false),
            nat: parse_flag(params.get(NAT), false),
            security_groups: params.get(SECURITY_GROUPS).map(|v| parse_csv(v)).unwrap_or_default(),
            machine_cores: parse_optional_int(params.get(MACHINE_CORES)).unwrap_or(0),
            machine_memory: parse_gib(params.get(MACHINE_MEMORY)),
            max_instances,
            preemptible: parse_flag(params.get(PREEMPTIBLE), false),
            disk_type: non_blank(params, DISK_TYPE),
            disk_size: parse_gib(params.get(DISK_SIZE)),
            secondary_disk_type: non_blank(params, SECONDARY_DISK_TYPE),
            secondary_disk_size: parse_gib(params.get(SECONDARY_DISK_SIZE)),
            secondary_disk_mount_path: non_blank(params, SECONDARY_DISK_MOUNT_PATH)
                .unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_string()),
            metadata: non_blank(params, METADATA),
            cloud_config: non_blank(params, CLOUD_CONFIG),
            dns_records: non_blank(params, DNS_RECORDS),
            hostname: non_blank(params, HOSTNAME),
            growing_id: parse_flag(params.get(GROWING_ID), false),
            service_account: non_blank(params, SERVICE_ACCOUNT),
            instance_folder: non_blank(params, INSTANCE_FOLDER),
            platform_id: non_blank(params, PLATFORM_ID),
            custom_props: non_blank(params, CUSTOM_PROPS),
            behaviour: CloneBehaviour::parse(params.get(BEHAVIOUR)),
        })
    }

    /// Parse the images document: a JSON array of option objects keyed by `source-id`
    pub fn parse_document(json: &str) -> Result<Vec<Self>> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Array(items) = value else {
            return Err(CloudError::Configuration("Images document must be a JSON array".to_string()));
        };
        items
            .iter()
            .map(|item| {
                let Value::Object(map) = item else {
                    return Err(CloudError::Configuration("Each image must be a JSON object".to_string()));
                };
                let params: HashMap<String, String> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), value_to_plain_string(v)))
                    .collect();
                let source_id = params.get(SOURCE_ID).cloned().unwrap_or_default();
                Self::from_params(&source_id, &params)
            })
            .collect()
    }

    pub fn load_file(path: &Path) -> Result<Vec<Self>> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CloudError::Configuration(format!("Failed to read images file {}: {}", path.display(), e))
        })?;
        Self::parse_document(&json)
    }

    /// Folder new instances are placed in
    pub fn effective_folder<'a>(&'a self, default_folder: &'a str) -> &'a str {
        self.instance_folder.as_deref().unwrap_or(default_folder)
    }
}
