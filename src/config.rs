use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CloudError, Result};

// Default configuration constants
pub const DEFAULT_API_ENDPOINT: &str = "https://api.cloud.yandex.net";
pub const DEFAULT_SERVER_ID: &str = "local";
pub const DEFAULT_PROFILE_ID: &str = "default";
pub const DEFAULT_ID_STORAGE: &str = ".yca";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_INSTANCES: usize = 1;
pub const DEFAULT_MOUNT_PATH: &str = "/mnt/data";
pub const GROWING_ID_FILE: &str = "growing-id";

// Token issuance
pub const IAM_TOKEN_AUDIENCE: &str = "https://iam.api.cloud.yandex.net/iam/v1/tokens";
pub const JWT_LIFETIME_SECS: i64 = 360;
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

// Image option keys
pub const SOURCE_ID: &str = "source-id";
pub const SOURCE_IMAGE: &str = "sourceImage";
pub const ZONE: &str = "zone";
pub const SUBNET: &str = "subnet";
pub const IPV6: &str = "ipv6";
pub const NAT: &str = "nat";
pub const SECURITY_GROUPS: &str = "securityGroups";
pub const MACHINE_CORES: &str = "machineCores";
pub const MACHINE_MEMORY: &str = "machineMemory";
pub const MAX_INSTANCES: &str = "maxInstances";
pub const PREEMPTIBLE: &str = "preemptible";
pub const DISK_TYPE: &str = "diskType";
pub const DISK_SIZE: &str = "diskSize";
pub const SECONDARY_DISK_TYPE: &str = "secondaryDiskType";
pub const SECONDARY_DISK_SIZE: &str = "secondaryDiskSize";
pub const SECONDARY_DISK_MOUNT_PATH: &str = "secondaryDiskMountPath";
pub const METADATA: &str = "metadata";
pub const CLOUD_CONFIG: &str = "cloudConfig";
pub const DNS_RECORDS: &str = "dnsRecords";
pub const HOSTNAME: &str = "hostname";
pub const GROWING_ID: &str = "growingId";
pub const SERVICE_ACCOUNT: &str = "serviceAccount";
pub const INSTANCE_FOLDER: &str = "instanceFolder";
pub const PLATFORM_ID: &str = "platformId";
pub const CUSTOM_PROPS: &str = "customProps";
pub const BEHAVIOUR: &str = "behaviour";

// Metadata tags identifying instances owned by this server/profile
pub const TAG_SERVER: &str = "ci-server";
pub const TAG_DATA: &str = "ci-data";
pub const TAG_PROFILE: &str = "ci-profile";
pub const TAG_SOURCE: &str = "ci-source";
pub const USER_DATA_KEY: &str = "user-data";

// Instance property keys
pub const PROP_ZONE: &str = "zone";
pub const PROP_COMPUTE_ID: &str = "computeID";
pub const PROP_FOLDER_ID: &str = "folderId";

// Agent bootstrap parameters
pub const AGENT_IMAGE_ID: &str = "cloud.image.id";
pub const AGENT_IMAGE_NAME: &str = "cloud.image.name";
pub const AGENT_INSTANCE_NAME: &str = "cloud.instance.name";

/// Roles that allow managing instances in a folder
pub const REQUIRED_ROLES: [&str; 2] = ["editor", "admin"];

pub fn load_env_file(env_file: Option<&str>) {
    if let Some(path) = env_file {
        dotenvy::from_path(Path::new(path)).ok();
    } else {
        dotenvy::dotenv().ok();
    }
}

pub fn get_api_endpoint() -> String {
    sanitize_base_url(&env::var("YC_API_ENDPOINT").unwrap_or_else(|_| DEFAULT_API_ENDPOINT.to_string()))
}

pub fn get_server_id() -> String {
    non_blank_env("YC_SERVER_ID").unwrap_or_else(|| DEFAULT_SERVER_ID.to_string())
}

pub fn get_profile_id() -> String {
    non_blank_env("YC_PROFILE_ID").unwrap_or_else(|| DEFAULT_PROFILE_ID.to_string())
}

pub fn get_id_storage() -> PathBuf {
    PathBuf::from(non_blank_env("YC_ID_STORAGE").unwrap_or_else(|| DEFAULT_ID_STORAGE.to_string()))
}

pub fn get_images_file() -> Option<PathBuf> {
    non_blank_env("YC_IMAGES_FILE").map(PathBuf::from)
}

pub fn get_sync_interval() -> Duration {
    let secs = non_blank_env("YC_SYNC_INTERVAL_SECS")
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS);
    Duration::from_secs(secs)
}

/// Read the service account key, either inline or from a file.
pub fn get_access_key() -> Result<String> {
    if let Some(key) = non_blank_env("YC_ACCESS_KEY") {
        return Ok(key);
    }
    match non_blank_env("YC_ACCESS_KEY_FILE") {
        Some(path) => std::fs::read_to_string(&path).map_err(|e| {
            CloudError::Configuration(format!("Failed to read access key file {}: {}", path, e))
        }),
        None => Err(CloudError::Configuration(
            "YC_ACCESS_KEY or YC_ACCESS_KEY_FILE must be set".to_string(),
        )),
    }
}

pub fn sanitize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_API_ENDPOINT.to_string()
    } else {
        trimmed.to_string()
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Everything a profile needs to build its connector and images.
#[derive(Debug, Clone)]
pub struct ProfileSettings {
    pub access_key: String,
    pub api_endpoint: String,
    pub server_id: String,
    pub profile_id: String,
    pub id_storage: PathBuf,
    pub images_file: Option<PathBuf>,
    pub sync_interval: Duration,
}

impl ProfileSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            access_key: get_access_key()?,
            api_endpoint: get_api_endpoint(),
            server_id: get_server_id(),
            profile_id: get_profile_id(),
            id_storage: get_id_storage(),
            images_file: get_images_file(),
            sync_interval: get_sync_interval(),
        })
    }

    pub fn growing_id_file(&self) -> PathBuf {
        self.id_storage.join(GROWING_ID_FILE)
    }
}
