//! Usage evaluation
//!
//! Turns a claim's raw usage signal into a validated [`UsagePercent`] and
//! compares it against a policy threshold.

use crate::domain::ports::{UsageError, UsagePercent, UsageSource};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;

/// Annotation carrying the claim's utilisation percentage
pub const DEFAULT_USAGE_ANNOTATION: &str = "pvc.gary.io/usage";

// =============================================================================
// Annotation Usage Source
// =============================================================================

/// Reads usage from a base-10 integer annotation on the claim
#[derive(Debug, Clone)]
pub struct AnnotationUsageSource {
    key: String,
}

impl AnnotationUsageSource {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Default for AnnotationUsageSource {
    fn default() -> Self {
        Self::new(DEFAULT_USAGE_ANNOTATION)
    }
}

#[async_trait]
impl UsageSource for AnnotationUsageSource {
    async fn usage(&self, claim: &PersistentVolumeClaim) -> Result<UsagePercent, UsageError> {
        let raw = claim
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(&self.key));
        parse_usage(&self.key, raw.map(String::as_str))
    }

    fn source_name(&self) -> &str {
        "annotation"
    }
}

/// Validate a raw usage string
pub fn parse_usage(key: &str, raw: Option<&str>) -> Result<UsagePercent, UsageError> {
    let raw = raw.ok_or_else(|| UsageError::Missing {
        key: key.to_string(),
    })?;
    raw.trim()
        .parse::<i64>()
        .map(UsagePercent)
        .map_err(|_| UsageError::Malformed {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

// =============================================================================
// Threshold Decision
// =============================================================================

/// Whether usage has reached the threshold. Inclusive.
pub fn exceeds_threshold(usage: UsagePercent, threshold_percent: i32) -> bool {
    usage.0 >= i64::from(threshold_percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn claim_with(annotations: Option<BTreeMap<String, String>>) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("data".into()),
                namespace: Some("default".into()),
                annotations,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn annotated(value: &str) -> PersistentVolumeClaim {
        claim_with(Some(BTreeMap::from([(
            DEFAULT_USAGE_ANNOTATION.to_string(),
            value.to_string(),
        )])))
    }

    #[tokio::test]
    async fn test_annotation_source_parses_integer() {
        let source = AnnotationUsageSource::default();
        assert_eq!(source.usage(&annotated("85")).await, Ok(UsagePercent(85)));
        assert_eq!(source.usage(&annotated(" 7 ")).await, Ok(UsagePercent(7)));
    }

    #[tokio::test]
    async fn test_annotation_source_data_errors() {
        let source = AnnotationUsageSource::default();

        assert_matches!(
            source.usage(&claim_with(None)).await,
            Err(UsageError::Missing { .. })
        );
        assert_matches!(
            source.usage(&annotated("eighty")).await,
            Err(UsageError::Malformed { value, .. }) if value == "eighty"
        );
        assert_matches!(
            source.usage(&annotated("85.5")).await,
            Err(UsageError::Malformed { .. })
        );
    }

    #[test]
    fn test_custom_key() {
        let source = AnnotationUsageSource::new("example.com/used");
        let claim = claim_with(Some(BTreeMap::from([(
            "example.com/used".to_string(),
            "12".to_string(),
        )])));
        assert_eq!(tokio_test::block_on(source.usage(&claim)), Ok(UsagePercent(12)));
        assert_matches!(
            tokio_test::block_on(source.usage(&annotated("99"))),
            Err(UsageError::Missing { key }) if key == "example.com/used"
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(exceeds_threshold(UsagePercent(85), 85));
        assert!(exceeds_threshold(UsagePercent(100), 85));
        assert!(!exceeds_threshold(UsagePercent(84), 85));
        assert!(exceeds_threshold(UsagePercent(0), 0));
    }
}
