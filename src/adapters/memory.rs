//! In-Memory Cluster Adapters
//!
//! A [`ClaimStore`] and [`NotificationSink`] held entirely in process. The
//! store keeps the API server's contract that matters to the resize logic:
//! label filtering, merge-patch semantics, and resourceVersion conflicts.

use crate::domain::ports::{ClaimId, ClaimPatch, ClaimStore, Notification, NotificationSink};
use crate::error::{Error, Result};
use crate::resize::selector::labels_match;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

// =============================================================================
// Fault Injection
// =============================================================================

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOperation {
    ListClaims,
    GetClaim,
    GetStorageClass,
    PatchClaim,
}

impl std::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreOperation::ListClaims => write!(f, "list_claims"),
            StoreOperation::GetClaim => write!(f, "get_claim"),
            StoreOperation::GetStorageClass => write!(f, "get_storage_class"),
            StoreOperation::PatchClaim => write!(f, "patch_claim"),
        }
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Cluster state store backed by in-process maps
#[derive(Default)]
pub struct InMemoryClusterStore {
    claims: RwLock<BTreeMap<ClaimId, PersistentVolumeClaim>>,
    storage_classes: RwLock<BTreeMap<String, StorageClass>>,
    /// Operations failing for every object
    failing_operations: RwLock<BTreeSet<StoreOperation>>,
    /// Claims whose patches are rejected
    failing_patches: RwLock<BTreeSet<ClaimId>>,
    /// Claims modified by another writer on their next read
    concurrent_writers: RwLock<BTreeSet<ClaimId>>,
    resource_version: AtomicU64,
    patches: AtomicUsize,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Store a claim, assigning a fresh resourceVersion. Returns the stored copy.
    pub async fn insert_claim(&self, mut claim: PersistentVolumeClaim) -> PersistentVolumeClaim {
        claim.metadata.resource_version = Some(self.next_version());
        self.claims
            .write()
            .await
            .insert(ClaimId::of(&claim), claim.clone());
        claim
    }

    pub async fn insert_storage_class(&self, class: StorageClass) {
        self.storage_classes
            .write()
            .await
            .insert(class.name_any(), class);
    }

    /// Make every call of `operation` fail
    pub async fn fail_on(&self, operation: StoreOperation) {
        self.failing_operations.write().await.insert(operation);
    }

    /// Reject patches to one claim
    pub async fn fail_patch_for(&self, id: ClaimId) {
        self.failing_patches.write().await.insert(id);
    }

    /// Have another writer modify the claim just before its next read
    pub async fn simulate_concurrent_write(&self, id: ClaimId) {
        self.concurrent_writers.write().await.insert(id);
    }

    /// Number of successful patches
    pub async fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    async fn check(&self, operation: StoreOperation) -> Result<()> {
        if self.failing_operations.read().await.contains(&operation) {
            return Err(Error::Internal(format!("injected {} failure", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl ClaimStore for InMemoryClusterStore {
    async fn list_claims(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        self.check(StoreOperation::ListClaims).await?;

        let claims = self.claims.read().await;
        Ok(claims
            .iter()
            .filter(|(id, _)| id.namespace == namespace)
            .filter(|(_, c)| labels_match(c.metadata.labels.as_ref(), match_labels))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        self.check(StoreOperation::GetClaim).await?;

        let id = ClaimId::new(namespace, name);
        let mut claims = self.claims.write().await;

        if self.concurrent_writers.write().await.remove(&id) {
            if let Some(claim) = claims.get_mut(&id) {
                claim
                    .annotations_mut()
                    .insert("example.com/touched-by".into(), "another-writer".into());
                claim.metadata.resource_version = Some(self.next_version());
                debug!(pvc = %id, "Simulated concurrent write");
            }
        }

        Ok(claims.get(&id).cloned())
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>> {
        self.check(StoreOperation::GetStorageClass).await?;
        Ok(self.storage_classes.read().await.get(name).cloned())
    }

    async fn patch_claim(&self, namespace: &str, name: &str, patch: &ClaimPatch) -> Result<()> {
        self.check(StoreOperation::PatchClaim).await?;

        let id = ClaimId::new(namespace, name);
        if self.failing_patches.read().await.contains(&id) {
            return Err(Error::Internal(format!("injected patch failure for {}", id)));
        }

        let mut claims = self.claims.write().await;
        let stored = claims.get_mut(&id).ok_or_else(|| Error::ResourceNotFound {
            kind: "PersistentVolumeClaim".into(),
            name: id.to_string(),
        })?;

        if patch.resource_version.is_some()
            && patch.resource_version != stored.metadata.resource_version
        {
            return Err(Error::Conflict {
                kind: "PersistentVolumeClaim".into(),
                name: id.to_string(),
            });
        }

        let mut document = serde_json::to_value(&*stored)?;
        merge_patch(&mut document, &patch.to_merge_patch());
        let mut updated: PersistentVolumeClaim = serde_json::from_value(document)?;
        updated.metadata.resource_version = Some(self.next_version());
        *stored = updated;

        self.patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Apply an RFC 7386 JSON merge patch in place
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_fields) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Some(target_fields) = target.as_object_mut() {
        for (key, value) in patch_fields {
            if value.is_null() {
                target_fields.remove(key);
            } else {
                merge_patch(target_fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

// =============================================================================
// Recording Sink
// =============================================================================

/// A notification captured by [`RecordingSink`]
#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub subject: ObjectReference,
    pub notification: Notification,
    pub recorded_at: DateTime<Utc>,
}

/// Notification sink that keeps every event in memory
#[derive(Default)]
pub struct RecordingSink {
    recorded: RwLock<Vec<RecordedNotification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order
    pub async fn notifications(&self) -> Vec<RecordedNotification> {
        self.recorded.read().await.clone()
    }

    /// Notifications attached to an object of `kind` named `name`
    pub async fn notifications_for(&self, kind: &str, name: &str) -> Vec<RecordedNotification> {
        self.recorded
            .read()
            .await
            .iter()
            .filter(|r| r.subject.kind.as_deref() == Some(kind))
            .filter(|r| r.subject.name.as_deref() == Some(name))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, subject: &ObjectReference, notification: Notification) {
        debug!(
            kind = ?subject.kind,
            name = ?subject.name,
            reason = %notification.reason,
            "Recording notification"
        );
        self.recorded.write().await.push(RecordedNotification {
            subject: subject.clone(),
            notification,
            recorded_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use kube::api::ObjectMeta;

    fn claim(namespace: &str, name: &str, app: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_patch_rfc7386() {
        let mut target = serde_json::json!({
            "a": "b",
            "c": { "d": "e", "f": "g" },
            "list": [1, 2]
        });
        merge_patch(
            &mut target,
            &serde_json::json!({ "a": "z", "c": { "f": null, "h": "i" }, "list": [3] }),
        );
        assert_eq!(
            target,
            serde_json::json!({ "a": "z", "c": { "d": "e", "h": "i" }, "list": [3] })
        );
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_labels() {
        let store = InMemoryClusterStore::new();
        store.insert_claim(claim("default", "a", "test")).await;
        store.insert_claim(claim("default", "b", "other")).await;
        store.insert_claim(claim("prod", "c", "test")).await;

        let selector = BTreeMap::from([("app".to_string(), "test".to_string())]);
        let listed = store.list_claims("default", &selector).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name_any(), "a");

        let all = store.list_claims("default", &BTreeMap::new()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_patch_requires_current_version() {
        let store = InMemoryClusterStore::new();
        let stored = store.insert_claim(claim("default", "a", "test")).await;

        let stale = ClaimPatch {
            resource_version: Some("999".into()),
            storage: Quantity("1Gi".into()),
        };
        assert_matches!(
            store.patch_claim("default", "a", &stale).await,
            Err(Error::Conflict { .. })
        );

        let fresh = ClaimPatch {
            resource_version: stored.metadata.resource_version.clone(),
            storage: Quantity("1Gi".into()),
        };
        store.patch_claim("default", "a", &fresh).await.unwrap();
        assert_eq!(store.patch_count().await, 1);

        // The version moved on, so the same patch now conflicts
        assert_matches!(
            store.patch_claim("default", "a", &fresh).await,
            Err(Error::Conflict { .. })
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryClusterStore::new();
        store.fail_on(StoreOperation::ListClaims).await;
        assert_matches!(
            store.list_claims("default", &BTreeMap::new()).await,
            Err(Error::Internal(_))
        );
    }

    #[tokio::test]
    async fn test_recording_sink_filters_by_subject() {
        let sink = RecordingSink::new();
        let subject = ObjectReference {
            kind: Some("PersistentVolumeClaim".into()),
            name: Some("a".into()),
            ..Default::default()
        };
        sink.publish(
            &subject,
            Notification::normal(crate::domain::ports::Reason::Resized, "ok"),
        )
        .await;

        assert_eq!(sink.notifications_for("PersistentVolumeClaim", "a").await.len(), 1);
        assert!(sink.notifications_for("PersistentVolumeClaim", "b").await.is_empty());
    }
}
