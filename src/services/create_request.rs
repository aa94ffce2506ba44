use serde_json::Value;
use std::collections::BTreeMap;

use super::cloud_config::{disk_setup_fragment, multipart_user_data};
use super::dns::parse_dns_records;
use crate::config::{
    AGENT_IMAGE_ID, AGENT_IMAGE_NAME, AGENT_INSTANCE_NAME, TAG_DATA, TAG_PROFILE, TAG_SERVER, TAG_SOURCE,
    USER_DATA_KEY,
};
use crate::error::Result;
use crate::image::ImageDetails;
use crate::models::{
    AgentUserData, AttachedDiskSpec, CreateInstanceRequest, DiskSpec, NetworkInterfaceSpec, OneToOneNatSpec,
    PrimaryAddressSpec, ResourcesSpec, SchedulingPolicy, SourceImage,
};

const RESERVED_KEYS: [&str; 5] = [USER_DATA_KEY, TAG_SERVER, TAG_DATA, TAG_PROFILE, TAG_SOURCE];

/// Everything needed to describe one new instance to the provider
pub struct CreateContext<'a> {
    pub details: &'a ImageDetails,
    pub source_image: &'a SourceImage,
    pub instance_name: &'a str,
    /// Folder of the service account, used unless the image overrides it
    pub default_folder_id: &'a str,
    pub server_id: &'a str,
    pub profile_id: &'a str,
    pub user_data: &'a AgentUserData,
}

pub fn build_create_request(ctx: &CreateContext<'_>) -> Result<CreateInstanceRequest> {
    let details = ctx.details;
    let name = ctx.instance_name;

    let mut params = vec![
        (AGENT_IMAGE_ID.to_string(), ctx.source_image.id.clone()),
        (AGENT_IMAGE_NAME.to_string(), ctx.source_image.name.clone()),
        (AGENT_INSTANCE_NAME.to_string(), name.to_string()),
    ];
    if let Some(raw) = details.custom_props.as_deref() {
        params.extend(parse_custom_props(raw));
    }
    let user_data = ctx.user_data.with_agent_name(name).with_params(params);

    let mut metadata = BTreeMap::new();
    metadata.insert(TAG_SERVER.to_string(), ctx.server_id.to_string());
    metadata.insert(TAG_DATA.to_string(), user_data.serialize()?);
    metadata.insert(TAG_PROFILE.to_string(), ctx.profile_id.to_string());
    metadata.insert(TAG_SOURCE.to_string(), details.source_id.clone());
    merge_metadata(&mut metadata, details.metadata.as_deref());

    let mut cloud_configs = Vec::new();
    if details.secondary_disk_size > 0 {
        cloud_configs.push(disk_setup_fragment(&details.secondary_disk_mount_path));
    }
    if let Some(custom) = details.cloud_config.as_deref().filter(|c| !c.trim().is_empty()) {
        cloud_configs.push(custom.to_string());
    }
    if !cloud_configs.is_empty() {
        metadata.insert(USER_DATA_KEY.to_string(), multipart_user_data(&cloud_configs));
    }

    let boot_size = if details.disk_size > 0 {
        details.disk_size
    } else {
        ctx.source_image.min_disk_size
    };
    let boot_disk_spec = AttachedDiskSpec {
        mode: "READ_WRITE".to_string(),
        device_name: None,
        auto_delete: true,
        disk_spec: DiskSpec {
            type_id: details.disk_type.clone(),
            size: boot_size,
            image_id: Some(ctx.source_image.id.clone()),
        },
    };

    let mut secondary_disk_specs = Vec::new();
    if details.secondary_disk_size > 0 {
        secondary_disk_specs.push(AttachedDiskSpec {
            mode: "READ_WRITE".to_string(),
            device_name: Some("secondary".to_string()),
            auto_delete: true,
            disk_spec: DiskSpec {
                type_id: details.secondary_disk_type.clone(),
                size: details.secondary_disk_size,
                image_id: None,
            },
        });
    }

    let primary_v4_address_spec = PrimaryAddressSpec {
        one_to_one_nat_spec: details.nat.then(OneToOneNatSpec::ipv4),
        dns_record_specs: Vec::new(),
    };
    let primary_v6_address_spec = details.ipv6.then(|| PrimaryAddressSpec {
        one_to_one_nat_spec: None,
        dns_record_specs: details
            .dns_records
            .as_deref()
            .map(|raw| parse_dns_records(raw, name))
            .unwrap_or_default(),
    });

    Ok(CreateInstanceRequest {
        folder_id: details.effective_folder(ctx.default_folder_id).to_string(),
        name: name.to_string(),
        zone_id: details.zone.clone(),
        platform_id: details.platform_id.clone(),
        hostname: details.hostname.as_ref().map(|h| h.replace("{name}", name)),
        resources_spec: ResourcesSpec {
            memory: details.machine_memory,
            cores: details.machine_cores,
        },
        metadata,
        boot_disk_spec,
        secondary_disk_specs,
        network_interface_specs: vec![NetworkInterfaceSpec {
            subnet_id: details.subnet.clone(),
            primary_v4_address_spec: Some(primary_v4_address_spec),
            primary_v6_address_spec,
            security_group_ids: details.security_groups.clone(),
        }],
        scheduling_policy: SchedulingPolicy {
            preemptible: details.preemptible,
        },
        service_account_id: details.service_account.clone(),
    })
}

/// Merge a free-form JSON object into instance metadata.
///
/// Reserved keys and non-string values are dropped with a warning; a document
/// that is not a JSON object is ignored entirely.
pub fn merge_metadata(metadata: &mut BTreeMap<String, String>, raw: Option<&str>) {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return;
    };
    let parsed = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            tracing::warn!("Instance metadata must be a JSON object, ignoring it");
            return;
        }
        Err(e) => {
            tracing::warn!("Failed to parse instance metadata: {}", e);
            return;
        }
    };

    for (key, value) in parsed {
        if RESERVED_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Metadata key is reserved, ignoring it");
            continue;
        }
        match value {
            Value::String(s) => {
                metadata.insert(key, s);
            }
            other => {
                tracing::warn!(key = %key, "Metadata value must be a string, got {}", other);
            }
        }
    }
}

/// Parse `key=value` pairs separated by commas; pairs without exactly one `=` are skipped
pub fn parse_custom_props(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(|pair| pair.trim())
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let parts: Vec<&str> = pair.split('=').collect();
            if parts.len() != 2 || parts[0].trim().is_empty() {
                tracing::debug!("Skipping malformed custom property '{}'", pair);
                return None;
            }
            Some((parts[0].trim().to_string(), parts[1].trim().to_string()))
        })
        .collect()
}
