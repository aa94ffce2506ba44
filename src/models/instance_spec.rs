use serde::Serialize;
use std::collections::BTreeMap;

/// Body of `POST /compute/v1/instances`
#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub folder_id: String,
    pub name: String,
    pub zone_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub resources_spec: ResourcesSpec,
    pub metadata: BTreeMap<String, String>,
    pub boot_disk_spec: AttachedDiskSpec,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_disk_specs: Vec<AttachedDiskSpec>,
    pub network_interface_specs: Vec<NetworkInterfaceSpec>,
    pub scheduling_policy: SchedulingPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    pub memory: i64,
    pub cores: i64,
}

#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDiskSpec {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    pub auto_delete: bool,
    pub disk_spec: DiskSpec,
}

#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceSpec {
    pub subnet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_v4_address_spec: Option<PrimaryAddressSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_v6_address_spec: Option<PrimaryAddressSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,
}

#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryAddressSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_to_one_nat_spec: Option<OneToOneNatSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_record_specs: Vec<DnsRecordSpec>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OneToOneNatSpec {
    pub ip_version: String,
}

impl OneToOneNatSpec {
    pub fn ipv4() -> Self {
        Self {
            ip_version: "IPV4".to_string(),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordSpec {
    pub fqdn: String,
    pub dns_zone_id: String,
    pub ttl: i64,
    pub ptr: bool,
}

#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPolicy {
    pub preemptible: bool,
}
