//! AutoResizePolicy CRD
//!
//! Declares when PersistentVolumeClaims in a namespace should be grown and
//! by how much.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// AutoResizePolicy CRD
// =============================================================================

/// AutoResizePolicy grows every selected claim in its namespace by
/// `increasePercent` once reported usage reaches `thresholdPercent`.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "storage.synaptikltd.io",
    version = "v1alpha1",
    kind = "AutoResizePolicy",
    plural = "autoresizepolicies",
    shortname = "arp",
    printcolumn = r#"{"name": "Threshold", "type": "integer", "jsonPath": ".spec.thresholdPercent"}"#,
    printcolumn = r#"{"name": "Increase", "type": "integer", "jsonPath": ".spec.increasePercent"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AutoResizePolicySpec {
    /// Usage percentage at or above which a claim is grown
    pub threshold_percent: i32,

    /// Percentage by which the requested size is increased
    pub increase_percent: i32,

    /// Claims this policy applies to; all claims in the namespace when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<PolicySelector>,
}

/// Exact-match label requirements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicySelector {
    /// Labels a claim must carry with identical values
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

// =============================================================================
// Implementations
// =============================================================================

impl AutoResizePolicy {
    /// Get the policy name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("unknown")
    }

    /// Namespace whose claims this policy governs
    pub fn target_namespace(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    /// Required labels, empty when the policy selects everything
    pub fn match_labels(&self) -> BTreeMap<String, String> {
        self.spec
            .selector
            .as_ref()
            .map(|s| s.match_labels.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: AutoResizePolicySpec = serde_json::from_value(serde_json::json!({
            "thresholdPercent": 85,
            "increasePercent": 25,
            "selector": { "matchLabels": { "app": "test" } }
        }))
        .unwrap();

        assert_eq!(spec.threshold_percent, 85);
        assert_eq!(spec.increase_percent, 25);
        assert_eq!(
            spec.selector.unwrap().match_labels.get("app").map(String::as_str),
            Some("test")
        );
    }

    #[test]
    fn test_match_labels_without_selector() {
        let policy = AutoResizePolicy::new(
            "p",
            AutoResizePolicySpec {
                threshold_percent: 80,
                increase_percent: 10,
                selector: None,
            },
        );
        assert!(policy.match_labels().is_empty());
        assert_eq!(policy.target_namespace(), "default");
        assert_eq!(policy.name(), "p");
    }

    #[test]
    fn test_crd_metadata() {
        let crd = AutoResizePolicy::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("autoresizepolicies.storage.synaptikltd.io")
        );
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}
