//! Domain Ports - Core trait definitions for the autoresizer
//!
//! These traits define the boundaries between the resize logic and the
//! cluster. Adapters implement them against the Kubernetes API or in memory.

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Resource name of the storage request on a claim
pub const STORAGE_RESOURCE: &str = "storage";

// =============================================================================
// Claim Identity
// =============================================================================

/// Namespaced identity of a claim
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId {
    pub namespace: String,
    pub name: String,
}

impl ClaimId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of a claim object as returned by the store
    pub fn of(claim: &PersistentVolumeClaim) -> Self {
        Self {
            namespace: claim.namespace().unwrap_or_default(),
            name: claim.name_any(),
        }
    }
}

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Normal,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Normal => write!(f, "Normal"),
            Severity::Warning => write!(f, "Warning"),
        }
    }
}

/// Machine-readable event reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    /// A single claim was resized
    Resized,
    /// A single claim, or a policy aggregate, failed to resize
    ResizeFailed,
    /// Aggregate success on the policy
    PVCResized,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::Resized => write!(f, "Resized"),
            Reason::ResizeFailed => write!(f, "ResizeFailed"),
            Reason::PVCResized => write!(f, "PVCResized"),
        }
    }
}

/// Structured operator-facing event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub reason: Reason,
    pub message: String,
}

impl Notification {
    pub fn normal(reason: Reason, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Normal,
            reason,
            message: message.into(),
        }
    }

    pub fn warning(reason: Reason, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            reason,
            message: message.into(),
        }
    }
}

// =============================================================================
// Claim Patch
// =============================================================================

/// Storage-request update anchored on the resourceVersion it was computed from
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimPatch {
    /// Version of the claim the new size was derived from
    pub resource_version: Option<String>,
    /// New `spec.resources.requests.storage`
    pub storage: Quantity,
}

impl ClaimPatch {
    /// Render as a JSON merge patch touching only the storage request.
    ///
    /// The resourceVersion turns the merge into a conditional update: the API
    /// server answers 409 if the claim changed after it was read.
    pub fn to_merge_patch(&self) -> serde_json::Value {
        let mut patch = serde_json::json!({
            "spec": {
                "resources": {
                    "requests": { "storage": self.storage.0 }
                }
            }
        });
        if let Some(rv) = &self.resource_version {
            patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
        }
        patch
    }
}

// =============================================================================
// Usage
// =============================================================================

/// Validated utilisation percentage of a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UsagePercent(pub i64);

impl std::fmt::Display for UsagePercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Why a usage signal could not be produced for a claim
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("usage signal {key} is missing")]
    Missing { key: String },

    #[error("usage signal {key} is not an integer: {value:?}")]
    Malformed { key: String, value: String },

    #[error("usage source unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Cluster Store Port
// =============================================================================

/// Port for the cluster state the resize logic reads and patches
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// List claims in a namespace carrying every given label
    async fn list_claims(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<PersistentVolumeClaim>>;

    /// Fetch the latest copy of a claim
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>>;

    /// Fetch a cluster-scoped storage class
    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>>;

    /// Apply a conditional storage-request patch
    async fn patch_claim(&self, namespace: &str, name: &str, patch: &ClaimPatch) -> Result<()>;
}

// =============================================================================
// Notification Sink Port
// =============================================================================

/// Port for operator-facing events. Delivery is best effort.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, subject: &ObjectReference, notification: Notification);
}

// =============================================================================
// Usage Source Port
// =============================================================================

/// Port producing a usage signal for a claim
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn usage(&self, claim: &PersistentVolumeClaim) -> std::result::Result<UsagePercent, UsageError>;

    /// Source name for logs
    fn source_name(&self) -> &str;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ClaimStoreRef = Arc<dyn ClaimStore>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
pub type UsageSourceRef = Arc<dyn UsageSource>;
