use serde::Deserialize;
use std::collections::HashMap;

/// Instance as reported by the compute API
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInstance {
    pub id: String,
    #[serde(default)]
    pub folder_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub zone_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub primary_v4_address: Option<PrimaryAddress>,
    #[serde(default)]
    pub primary_v6_address: Option<PrimaryAddress>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryAddress {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub one_to_one_nat: Option<OneToOneNat>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct OneToOneNat {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub ip_version: String,
}

impl ProviderInstance {
    /// Preferred address: IPv6, then NAT-mapped IPv4, then private IPv4
    pub fn ip_address(&self) -> Option<String> {
        let nic = self.network_interfaces.first()?;
        if let Some(v6) = nic.primary_v6_address.as_ref().filter(|a| !a.address.is_empty()) {
            return Some(v6.address.clone());
        }
        let v4 = nic.primary_v4_address.as_ref()?;
        if let Some(nat) = v4.one_to_one_nat.as_ref().filter(|n| !n.address.is_empty()) {
            return Some(nat.address.clone());
        }
        Some(v4.address.clone()).filter(|a| !a.is_empty())
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }
}
