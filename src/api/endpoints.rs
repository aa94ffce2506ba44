use serde::Deserialize;
use std::collections::HashMap;

use super::client::api_call;
use crate::error::Result;

#[derive(Deserialize, Debug)]
struct EndpointList {
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize, Debug)]
struct Endpoint {
    id: String,
    address: String,
}

/// Resolve named services to base URLs through the discovery endpoint
pub async fn discover_endpoints(client: &reqwest::Client, api_endpoint: &str) -> Result<HashMap<String, String>> {
    let payload = api_call(client, api_endpoint, None, "GET", "/endpoints", None, None).await?;
    let list: EndpointList = serde_json::from_value(payload)?;
    let endpoints: HashMap<String, String> = list
        .endpoints
        .into_iter()
        .map(|e| (e.id, service_url(&e.address)))
        .collect();
    tracing::debug!("Discovered {} service endpoints", endpoints.len());
    Ok(endpoints)
}

/// Addresses are published as `host:port`; plain addresses are reached over https
pub fn service_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}
