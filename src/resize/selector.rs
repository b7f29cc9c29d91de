//! Claim selection
//!
//! Resolves the claims a policy governs: every claim in the policy's
//! namespace whose labels are a superset of the policy's `matchLabels`.

use crate::crd::AutoResizePolicy;
use crate::domain::ports::ClaimStoreRef;
use crate::error::Result;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use std::collections::BTreeMap;

/// Render exact-match labels as a Kubernetes label selector string
pub fn label_selector(match_labels: &BTreeMap<String, String>) -> Option<String> {
    if match_labels.is_empty() {
        return None;
    }
    Some(
        match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// True when `labels` carries every required key with the same value
pub fn labels_match(
    labels: Option<&BTreeMap<String, String>>,
    match_labels: &BTreeMap<String, String>,
) -> bool {
    match_labels
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

/// Resolves candidate claims for a policy
pub struct ClaimSelector {
    store: ClaimStoreRef,
}

impl ClaimSelector {
    pub fn new(store: ClaimStoreRef) -> Self {
        Self { store }
    }

    /// List candidate claims. A listing failure is fatal for the pass.
    pub async fn select(&self, policy: &AutoResizePolicy) -> Result<Vec<PersistentVolumeClaim>> {
        let namespace = policy.target_namespace();
        let match_labels = policy.match_labels();
        self.store.list_claims(&namespace, &match_labels).await
    }
}
