use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PSS_SHA256};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::client::api_call;
use crate::config::{IAM_TOKEN_AUDIENCE, JWT_LIFETIME_SECS, TOKEN_REFRESH_MARGIN_SECS};
use crate::error::{CloudError, Result};
use crate::models::ServiceAccountKey;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    iam_token: String,
    #[serde(default)]
    expires_at: Option<String>,
}

#[derive(Clone, Debug)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

/// Exchanges service-account JWTs for short-lived IAM tokens.
///
/// The cached token is checked and replaced under a single lock, so callers
/// racing on an expired token trigger one exchange and share its result.
pub struct TokenIssuer {
    http: reqwest::Client,
    key: ServiceAccountKey,
    key_pair: RsaKeyPair,
    rng: SystemRandom,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenIssuer {
    pub fn new(http: reqwest::Client, key: ServiceAccountKey) -> Result<Self> {
        let pem = pem::parse(key.private_key.as_bytes())
            .map_err(|e| CloudError::Configuration(format!("Invalid private key PEM: {}", e)))?;
        let key_pair = RsaKeyPair::from_pkcs8(&pem.contents)
            .map_err(|e| CloudError::Configuration(format!("Unsupported private key: {}", e)))?;
        Ok(Self {
            http,
            key,
            key_pair,
            rng: SystemRandom::new(),
            cached: Mutex::new(None),
        })
    }

    /// Current IAM token, exchanging a fresh JWT when the cached one is close to expiry
    pub async fn token(&self, iam_base: &str) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let jwt = self.sign_jwt(now.timestamp())?;
        let body = json!({ "jwt": jwt });
        let payload = api_call(&self.http, iam_base, None, "POST", "/iam/v1/tokens", Some(&body), None).await?;
        let response: TokenResponse = serde_json::from_value(payload)
            .map_err(|e| CloudError::MalformedResponse(format!("IAM token response: {}", e)))?;

        let expires_at = response
            .expires_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|| now + Duration::seconds(JWT_LIFETIME_SECS));
        tracing::debug!(service_account = %self.key.service_account_id, %expires_at, "Issued IAM token");

        let value = response.iam_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at,
        });
        Ok(value)
    }

    /// PS256-signed JWT asserting the service account identity
    pub fn sign_jwt(&self, issued_at: i64) -> Result<String> {
        let header = json!({
            "typ": "JWT",
            "alg": "PS256",
            "kid": self.key.key_id,
        });
        let claims = json!({
            "iss": self.key.service_account_id,
            "aud": IAM_TOKEN_AUDIENCE,
            "iat": issued_at,
            "exp": issued_at + JWT_LIFETIME_SECS,
        });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );

        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&RSA_PSS_SHA256, &self.rng, signing_input.as_bytes(), &mut signature)
            .map_err(|_| CloudError::Configuration("Failed to sign JWT".to_string()))?;

        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
    }

    #[cfg(test)]
    async fn seed(&self, value: &str, expires_at: DateTime<Utc>) {
        *self.cached.lock().await = Some(CachedToken {
            value: value.to_string(),
            expires_at,
        });
    }
}
