use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::endpoints::discover_endpoints;
use super::token::TokenIssuer;
use crate::error::{CloudError, Result};
use crate::models::ServiceAccountKey;

const PAGE_SIZE: usize = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Core HTTP function for provider calls.
/// Handles bearer authentication, request building and error responses.
pub async fn api_call(
    client: &reqwest::Client,
    base_url: &str,
    bearer: Option<&str>,
    method: &str,
    endpoint: &str,
    body: Option<&Value>,
    params: Option<&[(String, String)]>,
) -> Result<Value> {
    let sensitive = endpoint.ends_with("/tokens");
    log_request(base_url, bearer.is_some(), method, endpoint, if sensitive { None } else { body }, params);

    let url = format!("{}{}", base_url, endpoint);
    let mut req = match method {
        "GET" => client.get(&url),
        "POST" => client.post(&url),
        "PATCH" => client.patch(&url),
        "DELETE" => client.delete(&url),
        _ => client.get(&url),
    };

    if let Some(token) = bearer {
        req = req.bearer_auth(token);
    }

    if let Some(p) = params {
        req = req.query(p);
    }

    if let Some(b) = body {
        req = req.json(b);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| CloudError::ProviderUnavailable(format!("{} {} failed: {}", method, url, e)))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| CloudError::ProviderUnavailable(format!("Failed to read response from {}: {}", url, e)))?;

    if sensitive {
        tracing::debug!(status = status.as_u16(), "Response: <redacted>");
    } else {
        tracing::debug!(status = status.as_u16(), "Response: {}", text);
    }

    if !status.is_success() {
        return Err(CloudError::ProviderRejected {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text)
        .map_err(|e| CloudError::MalformedResponse(format!("{} {}: {}", method, endpoint, e)))
}

/// Emit the curl equivalent of a request at debug level, never the token itself
fn log_request(
    base_url: &str,
    authorized: bool,
    method: &str,
    endpoint: &str,
    body: Option<&Value>,
    params: Option<&[(String, String)]>,
) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    let mut url_for_log = format!("{}{}", base_url, endpoint);
    if let Some(p) = params {
        if !p.is_empty() {
            let query_string = p
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<String>>()
                .join("&");
            url_for_log = format!("{}?{}", url_for_log, query_string);
        }
    }

    let mut parts = vec![format!("curl -X {} '{}'", method, url_for_log)];
    if authorized {
        parts.push("-H 'Authorization: Bearer ***'".to_string());
    }
    if let Some(d) = body {
        let json_str = serde_json::to_string(d).unwrap_or_default();
        parts.push("-H 'Content-Type: application/json'".to_string());
        parts.push(format!("-d '{}'", json_str.replace('\'', "'\\''")));
    }
    tracing::debug!("Request: {}", parts.join(" "));
}

fn error_message(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(|m| m.to_string()))
        .unwrap_or_else(|| text.trim().to_string())
}

/// Authenticated access to the provider's services.
///
/// Service addresses are discovered once, on first use; every call carries a
/// bearer token from the shared [`TokenIssuer`].
pub struct ApiClient {
    http: reqwest::Client,
    api_endpoint: String,
    endpoints: OnceCell<HashMap<String, String>>,
    tokens: TokenIssuer,
}

impl ApiClient {
    pub fn new(api_endpoint: &str, key: ServiceAccountKey) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("yca/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CloudError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        let tokens = TokenIssuer::new(http.clone(), key)?;
        Ok(Self {
            http,
            api_endpoint: api_endpoint.trim_end_matches('/').to_string(),
            endpoints: OnceCell::new(),
            tokens,
        })
    }

    /// Base URL of a named service (`compute`, `vpc`, `iam`, ...)
    pub async fn service_url(&self, service: &str) -> Result<String> {
        let endpoints = self
            .endpoints
            .get_or_try_init(|| discover_endpoints(&self.http, &self.api_endpoint))
            .await?;
        endpoints.get(service).cloned().ok_or_else(|| {
            CloudError::Configuration(format!("Endpoint for service {} is not published", service))
        })
    }

    pub async fn bearer(&self) -> Result<String> {
        let iam = self.service_url("iam").await?;
        self.tokens.token(&iam).await
    }

    pub async fn call(
        &self,
        service: &str,
        method: &str,
        endpoint: &str,
        body: Option<&Value>,
        params: Option<&[(String, String)]>,
    ) -> Result<Value> {
        let base = self.service_url(service).await?;
        let token = self.bearer().await?;
        api_call(&self.http, &base, Some(&token), method, endpoint, body, params).await
    }

    /// Fetch every page of a list endpoint and return the items under `items_key`
    pub async fn list_all(
        &self,
        service: &str,
        endpoint: &str,
        items_key: &str,
        params: &[(String, String)],
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = params.to_vec();
            query.push(("pageSize".into(), PAGE_SIZE.to_string()));
            if let Some(t) = &page_token {
                query.push(("pageToken".into(), t.clone()));
            }
            let payload = self.call(service, "GET", endpoint, None, Some(&query)).await?;
            if let Some(arr) = payload.get(items_key).and_then(|v| v.as_array()) {
                items.extend(arr.iter().cloned());
            }
            match payload
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
            {
                Some(next) => page_token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_message_field() {
        assert_eq!(error_message(r#"{"code":7,"message":"Permission denied"}"#), "Permission denied");
        assert_eq!(error_message("  upstream timeout "), "upstream timeout");
    }
}
