//! Error types for the PVC Autoresizer Operator
//!
//! Provides structured error types for the reconciliation engine, the
//! cluster store adapters and the usage sources.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Reconciliation cancelled")]
    Cancelled,

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Conflict updating {kind}/{name}: object was modified since it was read")]
    Conflict { kind: String, name: String },

    // =========================================================================
    // Resize Errors
    // =========================================================================
    #[error("Invalid quantity '{value}': {reason}")]
    InvalidQuantity { value: String, reason: String },

    // =========================================================================
    // Prometheus/Metrics Errors
    // =========================================================================
    #[error("Prometheus connection error: {0}")]
    PrometheusConnection(#[from] reqwest::Error),

    #[error("Prometheus query error: {0}")]
    PrometheusQuery(String),

    #[error("Prometheus response parse error: {0}")]
    PrometheusResponseParse(String),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Lost an optimistic-concurrency race, the next read will be fresh
            Error::Conflict { .. } => ErrorAction::RequeueAfter(Duration::from_secs(5)),

            // Transient errors - retry with backoff
            Error::PrometheusConnection(_) | Error::Kube(_) => ErrorAction::RequeueWithBackoff,

            // Shutting down or misconfigured - don't retry automatically
            Error::Cancelled
            | Error::Configuration(_)
            | Error::InvalidQuantity { .. } => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::PrometheusConnection(_) | Error::Kube(_) | Error::Conflict { .. }
        )
    }

    /// Check if this error reports a lost optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube(kube::Error::Api(response)) => response.code == 409,
            _ => false,
        }
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::Conflict {
            kind: "PersistentVolumeClaim".into(),
            name: "default/data".into(),
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(5))
        );

        let err = Error::Configuration("bad config".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::Cancelled;
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::PrometheusQuery("bad query".into());
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::Conflict {
            kind: "PersistentVolumeClaim".into(),
            name: "default/data".into(),
        };
        assert!(transient.is_retryable());
        assert!(transient.is_transient());
        assert!(transient.is_conflict());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
        assert!(!config_err.is_transient());
        assert!(!config_err.is_conflict());
    }

    #[test]
    fn test_kube_409_is_conflict() {
        let err = Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "the object has been modified".into(),
            reason: "Conflict".into(),
            code: 409,
        }));
        assert!(err.is_conflict());

        let err = Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "forbidden".into(),
            reason: "Forbidden".into(),
            code: 403,
        }));
        assert!(!err.is_conflict());
    }
}
