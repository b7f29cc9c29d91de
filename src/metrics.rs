//! Operator Metrics
//!
//! Prometheus counters describing reconciliation passes and their outcomes.

use crate::error::Result;
use crate::resize::ReconcileReport;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters exported on `/metrics`
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconcile_passes: IntCounterVec,
    resized: IntCounter,
    resize_failures: IntCounter,
    skipped: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reconcile_passes = IntCounterVec::new(
            Opts::new(
                "pvc_autoresizer_reconcile_passes_total",
                "Reconciliation passes by result",
            ),
            &["result"],
        )?;
        let resized = IntCounter::new(
            "pvc_autoresizer_resized_total",
            "PVCs whose storage request was increased",
        )?;
        let resize_failures = IntCounter::new(
            "pvc_autoresizer_resize_failures_total",
            "PVC resize patches rejected by the API server",
        )?;
        let skipped = IntCounterVec::new(
            Opts::new("pvc_autoresizer_skipped_total", "PVCs left untouched by reason"),
            &["reason"],
        )?;

        registry.register(Box::new(reconcile_passes.clone()))?;
        registry.register(Box::new(resized.clone()))?;
        registry.register(Box::new(resize_failures.clone()))?;
        registry.register(Box::new(skipped.clone()))?;

        Ok(Self {
            registry,
            reconcile_passes,
            resized,
            resize_failures,
            skipped,
        })
    }

    /// Record a completed pass
    pub fn observe_report(&self, report: &ReconcileReport) {
        let result = if report.cancelled { "cancelled" } else { "success" };
        self.reconcile_passes.with_label_values(&[result]).inc();
        self.resized.inc_by(report.resized.len() as u64);
        self.resize_failures.inc_by(report.failed.len() as u64);
        for (reason, count) in &report.skipped {
            self.skipped.with_label_values(&[*reason]).inc_by(*count as u64);
        }
    }

    /// Record a pass that aborted before producing a report
    pub fn observe_error(&self) {
        self.reconcile_passes.with_label_values(&["error"]).inc();
    }

    /// Render all metrics in the text exposition format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ClaimId;
    use crate::resize::{FailedClaim, ResizedClaim};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;

    #[test]
    fn test_observe_report() {
        let metrics = Metrics::new().unwrap();
        let report = ReconcileReport {
            policy: "default/test-policy".into(),
            candidates: 4,
            resized: vec![ResizedClaim {
                claim: ClaimId::new("default", "a"),
                old_size: Quantity("5Gi".into()),
                new_size: Quantity("6400Mi".into()),
            }],
            failed: vec![FailedClaim {
                claim: ClaimId::new("default", "b"),
                new_size: Quantity("6400Mi".into()),
                error: "boom".into(),
                conflict: false,
            }],
            skipped: BTreeMap::from([("below_threshold", 2)]),
            cancelled: false,
            completed_at: chrono::Utc::now(),
        };

        metrics.observe_report(&report);
        metrics.observe_error();

        let (content_type, body) = metrics.encode().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("pvc_autoresizer_resized_total 1"));
        assert!(text.contains("pvc_autoresizer_resize_failures_total 1"));
        assert!(text.contains(r#"pvc_autoresizer_skipped_total{reason="below_threshold"} 2"#));
        assert!(text.contains(r#"pvc_autoresizer_reconcile_passes_total{result="error"} 1"#));
    }
}
