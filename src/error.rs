/// Error types shared by the connector and the image orchestrator
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while talking to the provider or driving instances
#[derive(Debug, Error)]
pub enum CloudError {
    /// Local quota check refused a new instance
    #[error("Unable to start more instances: {0}")]
    QuotaExceeded(String),

    /// The provider could not be reached
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider answered with a non-success status
    #[error("Provider rejected request (HTTP {status}): {message}")]
    ProviderRejected { status: u16, message: String },

    /// The provider answered with something we cannot interpret
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Image prerequisites are not met; every failed check is listed
    #[error("Image validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// The service account lacks the required role
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Credentials or image options are unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The image was disposed and accepts no more work
    #[error("Image {0} has been disposed")]
    Disposed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CloudError {
    pub fn not_found(message: impl Into<String>) -> Self {
        CloudError::ProviderRejected {
            status: 404,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::ProviderRejected { status: 404, .. })
    }
}

impl From<reqwest::Error> for CloudError {
    fn from(e: reqwest::Error) -> Self {
        CloudError::ProviderUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Structured error info recorded on an instance when a workflow fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceError {
    /// Human readable message
    pub message: String,
    /// Debug rendering of the underlying error
    pub details: String,
    /// When the failure was captured
    pub at: DateTime<Utc>,
}

impl InstanceError {
    pub fn from_error(error: &CloudError) -> Self {
        Self {
            message: error.to_string(),
            details: format!("{:?}", error),
            at: Utc::now(),
        }
    }
}
