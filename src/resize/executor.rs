//! Resize execution
//!
//! Commits a new storage request to a single claim with a conditional merge
//! patch. Only `spec.resources.requests.storage` is written; everything else on
//! the claim is left to the API server's merge semantics. No retries.

use crate::domain::ports::{ClaimId, ClaimPatch, ClaimStoreRef};
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::debug;

const CLAIM_KIND: &str = "PersistentVolumeClaim";

/// Applies computed sizes to claims
pub struct ResizeExecutor {
    store: ClaimStoreRef,
}

impl ResizeExecutor {
    pub fn new(store: ClaimStoreRef) -> Self {
        Self { store }
    }

    /// Set the storage request of `snapshot`'s claim to `new_size`.
    ///
    /// The patch is anchored on the resourceVersion of the snapshot the size
    /// was computed from. If the claim has moved on since, this returns
    /// [`Error::Conflict`] instead of overwriting the newer state.
    pub async fn apply(&self, snapshot: &PersistentVolumeClaim, new_size: &Quantity) -> Result<()> {
        let id = ClaimId::of(snapshot);

        let latest = self
            .store
            .get_claim(&id.namespace, &id.name)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: CLAIM_KIND.into(),
                name: id.to_string(),
            })?;

        let read_version = snapshot.metadata.resource_version.as_ref();
        let latest_version = latest.metadata.resource_version.as_ref();
        if read_version.is_some() && read_version != latest_version {
            return Err(Error::Conflict {
                kind: CLAIM_KIND.into(),
                name: id.to_string(),
            });
        }

        let patch = ClaimPatch {
            resource_version: latest_version.cloned(),
            storage: new_size.clone(),
        };

        debug!(
            pvc = %id,
            resource_version = ?patch.resource_version,
            new_size = %new_size.0,
            "Patching claim storage request"
        );

        self.store.patch_claim(&id.namespace, &id.name, &patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryClusterStore, StoreOperation};
    use crate::domain::ports::ClaimStore;
    use assert_matches::assert_matches;
    use k8s_openapi::api::core::v1::{PersistentVolumeClaimSpec, VolumeResourceRequirements};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn claim() -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("data".into()),
                namespace: Some("default".into()),
                labels: Some(BTreeMap::from([("app".to_string(), "test".to_string())])),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                storage_class_name: Some("standard".into()),
                access_modes: Some(vec!["ReadWriteOnce".into()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([
                        ("storage".to_string(), Quantity("5Gi".into())),
                        ("example.com/iops".to_string(), Quantity("3000".into())),
                    ])),
                    limits: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity("50Gi".into()),
                    )])),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn setup() -> (Arc<InMemoryClusterStore>, ResizeExecutor, PersistentVolumeClaim) {
        let store = Arc::new(InMemoryClusterStore::new());
        let stored = store.insert_claim(claim()).await;
        let executor = ResizeExecutor::new(store.clone());
        (store, executor, stored)
    }

    #[tokio::test]
    async fn test_apply_sets_only_storage_request() {
        let (store, executor, snapshot) = setup().await;

        executor
            .apply(&snapshot, &Quantity("6400Mi".into()))
            .await
            .unwrap();

        let updated = store.get_claim("default", "data").await.unwrap().unwrap();
        let spec = updated.spec.as_ref().unwrap();
        let resources = spec.resources.as_ref().unwrap();
        let requests = resources.requests.as_ref().unwrap();

        assert_eq!(requests["storage"].0, "6400Mi");
        assert_eq!(requests["example.com/iops"].0, "3000");
        assert_eq!(resources.limits.as_ref().unwrap()["storage"].0, "50Gi");
        assert_eq!(spec.access_modes, snapshot.spec.as_ref().unwrap().access_modes);
        assert_eq!(updated.metadata.labels, snapshot.metadata.labels);
        assert_ne!(
            updated.metadata.resource_version,
            snapshot.metadata.resource_version
        );
    }

    #[tokio::test]
    async fn test_stale_snapshot_conflicts() {
        let (store, executor, snapshot) = setup().await;

        // Another actor wins the race
        executor
            .apply(&snapshot, &Quantity("6Gi".into()))
            .await
            .unwrap();

        let err = executor
            .apply(&snapshot, &Quantity("7Gi".into()))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let current = store.get_claim("default", "data").await.unwrap().unwrap();
        let requests = current.spec.unwrap().resources.unwrap().requests.unwrap();
        assert_eq!(requests["storage"].0, "6Gi");
    }

    #[tokio::test]
    async fn test_missing_claim() {
        let (_, executor, mut snapshot) = setup().await;
        snapshot.metadata.name = Some("gone".into());

        let err = executor
            .apply(&snapshot, &Quantity("6Gi".into()))
            .await
            .unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { .. });
    }

    #[tokio::test]
    async fn test_store_error_is_returned() {
        let (store, executor, snapshot) = setup().await;
        store.fail_on(StoreOperation::PatchClaim).await;

        let err = executor
            .apply(&snapshot, &Quantity("6Gi".into()))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Internal(_));
    }
}
