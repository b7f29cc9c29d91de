//! Volume expansion eligibility
//!
//! A claim may only be grown when its storage class sets
//! `allowVolumeExpansion: true`. Every other outcome is a skip.

use crate::domain::ports::ClaimStoreRef;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::api::storage::v1::StorageClass;

/// Verdict on whether a claim can be grown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Storage class allows expansion
    Eligible { storage_class: String },
    /// Claim does not name a storage class
    NoStorageClass,
    /// Named storage class does not exist
    StorageClassNotFound { storage_class: String },
    /// Storage class lookup failed
    StorageClassUnavailable { storage_class: String, reason: String },
    /// Storage class exists but does not allow expansion
    ExpansionDisallowed { storage_class: String },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }

    /// Short label for metrics and logs
    pub fn skip_reason(&self) -> Option<&'static str> {
        match self {
            Eligibility::Eligible { .. } => None,
            Eligibility::NoStorageClass => Some("no_storage_class"),
            Eligibility::StorageClassNotFound { .. } => Some("storage_class_not_found"),
            Eligibility::StorageClassUnavailable { .. } => Some("storage_class_unavailable"),
            Eligibility::ExpansionDisallowed { .. } => Some("expansion_disallowed"),
        }
    }
}

/// Whether a storage class allows expansion; absent means no
pub fn class_allows_expansion(class: &StorageClass) -> bool {
    class.allow_volume_expansion.unwrap_or(false)
}

/// Resolves a claim's storage class and decides eligibility
pub struct ExpansionEligibilityChecker {
    store: ClaimStoreRef,
}

impl ExpansionEligibilityChecker {
    pub fn new(store: ClaimStoreRef) -> Self {
        Self { store }
    }

    /// Check a claim. Never fails: lookup errors produce a non-eligible verdict.
    pub async fn check(&self, claim: &PersistentVolumeClaim) -> Eligibility {
        let Some(class_name) = claim
            .spec
            .as_ref()
            .and_then(|s| s.storage_class_name.clone())
            .filter(|n| !n.is_empty())
        else {
            return Eligibility::NoStorageClass;
        };

        match self.store.get_storage_class(&class_name).await {
            Ok(Some(class)) if class_allows_expansion(&class) => Eligibility::Eligible {
                storage_class: class_name,
            },
            Ok(Some(_)) => Eligibility::ExpansionDisallowed {
                storage_class: class_name,
            },
            Ok(None) => Eligibility::StorageClassNotFound {
                storage_class: class_name,
            },
            Err(e) => Eligibility::StorageClassUnavailable {
                storage_class: class_name,
                reason: e.to_string(),
            },
        }
    }
}
