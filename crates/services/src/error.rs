//! Shared error types for the services crate.

use std::collections::BTreeMap;

use thiserror::Error;

use quiz_core::FailureClass;
use quiz_core::model::PreferencesError;
use storage::StorageError;
use storage::sqlite::SqliteInitError;

/// The request never produced an HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    #[error("network unreachable: {0}")]
    Unreachable(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure of an API call, classified by how callers should react.
///
/// Cloneable so one refresh failure can be handed to every queued request.
#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum ApiError {
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        errors: BTreeMap<String, Vec<String>>,
    },
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },
    #[error(transparent)]
    Network(#[from] TransportError),
    #[error("no access token available")]
    NoToken,
    #[error("token refresh failed: {0}")]
    RefreshFailed(Box<ApiError>),
    #[error("request rejected: {0}")]
    Envelope(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// HTTP status carried by the error, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Validation { .. } => Some(422),
            ApiError::Server { status, .. } | ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    /// Bucket used by the progress sync retry policy.
    #[must_use]
    pub fn failure_class(&self) -> FailureClass {
        match self {
            ApiError::Server { .. } => FailureClass::Server,
            ApiError::Network(_) => FailureClass::Network,
            _ => FailureClass::Rejected,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Errors emitted by `ClientConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid API base URL {raw}: {reason}")]
    InvalidBaseUrl { raw: String, reason: String },
    #[error("invalid {key} value: {raw}")]
    InvalidNumber { key: &'static str, raw: String },
}

/// Errors emitted by `PreferencesService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PreferencesServiceError {
    #[error(transparent)]
    Preferences(#[from] PreferencesError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_classes() {
        let server = ApiError::Server {
            status: 503,
            message: "down".into(),
        };
        assert_eq!(server.failure_class(), FailureClass::Server);
        assert_eq!(server.status(), Some(503));

        let network = ApiError::from(TransportError::Unreachable("dns".into()));
        assert_eq!(network.failure_class(), FailureClass::Network);
        assert!(network.is_network());
        assert_eq!(network.status(), None);

        let invalid = ApiError::Validation {
            message: "bad".into(),
            errors: BTreeMap::new(),
        };
        assert_eq!(invalid.failure_class(), FailureClass::Rejected);
    }
}
