use serde::Deserialize;

use crate::utils::lenient_i64;

/// Boot image a template refers to
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceImage {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub min_disk_size: i64,
}

impl SourceImage {
    /// Description when present, otherwise the name
    pub fn display_name(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}
