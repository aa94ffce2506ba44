use serde::Deserialize;

use super::client::ApiClient;
use crate::config::REQUIRED_ROLES;
use crate::error::{CloudError, Result};

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccessBinding {
    pub role_id: String,
    pub subject: Subject,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Subject {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Default folder of a service account
pub async fn get_service_account_folder(api: &ApiClient, service_account_id: &str) -> Result<String> {
    let endpoint = format!("/iam/v1/serviceAccounts/{}", service_account_id);
    let payload = api.call("iam", "GET", &endpoint, None, None).await?;
    payload
        .get("folderId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            CloudError::MalformedResponse(format!("Service account {} has no folderId", service_account_id))
        })
}

pub async fn list_access_bindings(api: &ApiClient, folder_id: &str) -> Result<Vec<AccessBinding>> {
    let endpoint = format!("/resource-manager/v1/folders/{}:listAccessBindings", folder_id);
    let items = api.list_all("resourcemanager", &endpoint, "accessBindings", &[]).await?;
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Succeed only if the service account holds one of the managing roles on the folder
pub async fn check_access(api: &ApiClient, service_account_id: &str, folder_id: &str) -> Result<()> {
    let bindings = list_access_bindings(api, folder_id).await.map_err(|e| match e {
        CloudError::ProviderRejected { status, message } => {
            CloudError::AccessDenied(format!("Cannot read access bindings of folder {} (HTTP {}): {}", folder_id, status, message))
        }
        other => other,
    })?;
    if has_required_role(&bindings, service_account_id) {
        Ok(())
    } else {
        Err(CloudError::AccessDenied(format!(
            "Service account {} needs one of roles [{}] on folder {}",
            service_account_id,
            REQUIRED_ROLES.join(", "),
            folder_id
        )))
    }
}

fn has_required_role(bindings: &[AccessBinding], service_account_id: &str) -> bool {
    bindings
        .iter()
        .any(|b| b.subject.id == service_account_id && REQUIRED_ROLES.contains(&b.role_id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(role: &str, subject: &str) -> AccessBinding {
        AccessBinding {
            role_id: role.to_string(),
            subject: Subject {
                id: subject.to_string(),
                kind: "serviceAccount".to_string(),
            },
        }
    }

    #[test]
    fn test_role_must_belong_to_the_account() {
        let bindings = vec![binding("viewer", "sa-1"), binding("editor", "sa-2")];
        assert!(!has_required_role(&bindings, "sa-1"));
        assert!(has_required_role(&bindings, "sa-2"));
        assert!(has_required_role(&[binding("admin", "sa-1")], "sa-1"));
    }
}
