use serde_json::Value;

use super::client::ApiClient;
use crate::error::{CloudError, Result};
use crate::models::{CreateInstanceRequest, Operation, ProviderInstance};

const INSTANCES: &str = "/compute/v1/instances";

/// Power actions exposed as custom methods on an instance resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAction {
    Start,
    Stop,
    Restart,
}

impl InstanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceAction::Start => "start",
            InstanceAction::Stop => "stop",
            InstanceAction::Restart => "restart",
        }
    }
}

fn parse_operation(payload: Value) -> Result<Operation> {
    let op: Operation = serde_json::from_value(payload)
        .map_err(|e| CloudError::MalformedResponse(format!("operation: {}", e)))?;
    op.check()
}

/// Submit a create request; the returned operation names the new compute id
pub async fn create_instance(api: &ApiClient, request: &CreateInstanceRequest) -> Result<Operation> {
    let body = serde_json::to_value(request)?;
    let payload = api.call("compute", "POST", INSTANCES, Some(&body), None).await?;
    parse_operation(payload)
}

/// Fetch one instance with its full metadata
pub async fn get_instance(api: &ApiClient, compute_id: &str) -> Result<ProviderInstance> {
    let endpoint = format!("{}/{}", INSTANCES, compute_id);
    let params = vec![("view".to_string(), "FULL".to_string())];
    let payload = api.call("compute", "GET", &endpoint, None, Some(&params)).await?;
    serde_json::from_value(payload).map_err(|e| CloudError::MalformedResponse(format!("instance {}: {}", compute_id, e)))
}

/// All instances of a folder; list results omit user metadata
pub async fn list_instances(api: &ApiClient, folder_id: &str) -> Result<Vec<ProviderInstance>> {
    let params = vec![("folderId".to_string(), folder_id.to_string())];
    let items = api.list_all("compute", INSTANCES, "instances", &params).await?;
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| CloudError::MalformedResponse(format!("instance list: {}", e)))
        })
        .collect()
}

pub async fn find_instance_by_name(api: &ApiClient, folder_id: &str, name: &str) -> Result<Option<ProviderInstance>> {
    let params = vec![
        ("folderId".to_string(), folder_id.to_string()),
        ("filter".to_string(), format!("name=\"{}\"", name)),
    ];
    let items = api.list_all("compute", INSTANCES, "instances", &params).await?;
    let found = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<ProviderInstance>(item).ok())
        .find(|inst| inst.name == name);
    Ok(found)
}

pub async fn instance_action(api: &ApiClient, compute_id: &str, action: InstanceAction) -> Result<Operation> {
    let endpoint = format!("{}/{}:{}", INSTANCES, compute_id, action.as_str());
    let payload = api.call("compute", "POST", &endpoint, None, None).await?;
    parse_operation(payload)
}

pub async fn delete_instance(api: &ApiClient, compute_id: &str) -> Result<Operation> {
    let endpoint = format!("{}/{}", INSTANCES, compute_id);
    let payload = api.call("compute", "DELETE", &endpoint, None, None).await?;
    parse_operation(payload)
}
