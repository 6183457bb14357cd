//! Error types for the cluster clients

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the cluster or the cloud provider
#[derive(Debug, Error)]
pub enum ClientError {
    /// Kubernetes API request failed
    #[error("Kubernetes request failed: {0}")]
    Kube(#[from] kube::Error),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Manifest could not be read or applied
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Cluster credentials could not be assembled
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(String),

    /// No usable access token
    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// HTTP status behind this error, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::Kube(kube::Error::Api(response)) => Some(response.code),
            Self::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || self.status() == Some(404)
    }

    /// Check if the object already exists
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// Check if retrying the same request may succeed
    ///
    /// Covers dropped connections, throttling, server errors, objects that
    /// do not exist yet and containers that are still being created (the
    /// log endpoint answers 400 until the container starts).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Kube(kube::Error::HyperError(_) | kube::Error::Service(_)) => true,
            Self::RequestFailed(e) if e.is_connect() || e.is_timeout() => true,
            _ => matches!(self.status(), Some(400 | 404 | 429) | Some(500..=599)),
        }
    }
}
