//! Reconciliation Engine
//!
//! Evaluates one AutoResizePolicy against its candidate claims:
//!
//! ```text
//! Selected -> UsageChecked -> EligibilityChecked -> SizeComputed -> Applied
//!                 |                  |                                  |
//!              Skipped            Skipped                    Resized | Failed
//! ```
//!
//! Claims are processed sequentially. A skip or failure on one claim never
//! stops the others; only a failure to list candidates aborts the pass.

use crate::crd::AutoResizePolicy;
use crate::domain::ports::{
    ClaimId, ClaimStoreRef, Notification, NotificationSinkRef, Reason, UsageError,
    UsageSourceRef,
};
use crate::error::{Error, Result};
use crate::resize::eligibility::{Eligibility, ExpansionEligibilityChecker};
use crate::resize::executor::ResizeExecutor;
use crate::resize::quantity::calculate_new_size;
use crate::resize::selector::ClaimSelector;
use crate::resize::usage::exceeds_threshold;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::Resource;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Outcomes
// =============================================================================

/// A claim whose storage request was increased
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizedClaim {
    pub claim: ClaimId,
    pub old_size: Quantity,
    pub new_size: Quantity,
}

/// A claim whose resize was attempted and rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedClaim {
    pub claim: ClaimId,
    pub new_size: Quantity,
    pub error: String,
    /// Lost an optimistic-concurrency race
    pub conflict: bool,
}

/// Why a claim was left untouched
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    UsageUnavailable(UsageError),
    BelowThreshold,
    NoStorageRequest,
    InvalidSize(String),
    Ineligible(Eligibility),
}

impl SkipReason {
    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::UsageUnavailable(_) => "usage_unavailable",
            SkipReason::BelowThreshold => "below_threshold",
            SkipReason::NoStorageRequest => "no_storage_request",
            SkipReason::InvalidSize(_) => "invalid_size",
            SkipReason::Ineligible(e) => e.skip_reason().unwrap_or("ineligible"),
        }
    }
}

/// Terminal state of one claim within a pass
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Resized(ResizedClaim),
    Failed(FailedClaim),
    Skipped(SkipReason),
}

/// Result of one policy evaluation
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// `namespace/name` of the policy
    pub policy: String,
    /// Number of claims returned by the selector
    pub candidates: usize,
    pub resized: Vec<ResizedClaim>,
    pub failed: Vec<FailedClaim>,
    /// Skip counts by reason label
    pub skipped: BTreeMap<&'static str, usize>,
    /// Pass stopped early on cancellation
    pub cancelled: bool,
    pub completed_at: DateTime<Utc>,
}

impl ReconcileReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Orchestrates selection, gating, sizing and patching for a policy
pub struct ReconciliationEngine {
    selector: ClaimSelector,
    eligibility: ExpansionEligibilityChecker,
    executor: ResizeExecutor,
    usage: UsageSourceRef,
    sink: NotificationSinkRef,
}

impl ReconciliationEngine {
    pub fn new(store: ClaimStoreRef, usage: UsageSourceRef, sink: NotificationSinkRef) -> Self {
        Self {
            selector: ClaimSelector::new(store.clone()),
            eligibility: ExpansionEligibilityChecker::new(store.clone()),
            executor: ResizeExecutor::new(store),
            usage,
            sink,
        }
    }

    /// Run one reconciliation pass for `policy`.
    ///
    /// Fails only when candidates cannot be listed or the pass is cancelled
    /// before listing completes. Per-claim problems land in the report.
    pub async fn reconcile(
        &self,
        policy: &AutoResizePolicy,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport> {
        let policy_id = ClaimId::new(policy.target_namespace(), policy.name()).to_string();

        let mut claims = match guarded(cancel, self.selector.select(policy)).await {
            Some(Ok(claims)) => claims,
            Some(Err(e)) => {
                error!(policy = %policy_id, error = %e, "Unable to list PVCs");
                return Err(e);
            }
            None => return Err(Error::Cancelled),
        };

        claims.sort_by_key(ClaimId::of);
        claims.dedup_by_key(|c| ClaimId::of(c));
        debug!(policy = %policy_id, count = claims.len(), "PVCs listed");

        let mut report = ReconcileReport {
            policy: policy_id.clone(),
            candidates: claims.len(),
            resized: Vec::new(),
            failed: Vec::new(),
            skipped: BTreeMap::new(),
            cancelled: false,
            completed_at: Utc::now(),
        };

        for claim in &claims {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let Some(outcome) = self.process_claim(policy, claim, cancel).await else {
                report.cancelled = true;
                break;
            };

            match outcome {
                ClaimOutcome::Resized(resized) => report.resized.push(resized),
                ClaimOutcome::Failed(failed) => report.failed.push(failed),
                ClaimOutcome::Skipped(reason) => {
                    *report.skipped.entry(reason.label()).or_default() += 1;
                }
            }
        }

        if report.cancelled {
            warn!(policy = %policy_id, "Reconciliation cancelled, remaining PVCs not evaluated");
        }

        self.publish_aggregates(policy, &report).await;
        report.completed_at = Utc::now();
        Ok(report)
    }

    /// Drive one claim to a terminal state. `None` when cancelled mid-flight.
    pub async fn process_claim(
        &self,
        policy: &AutoResizePolicy,
        claim: &PersistentVolumeClaim,
        cancel: &CancellationToken,
    ) -> Option<ClaimOutcome> {
        let id = ClaimId::of(claim);

        // UsageChecked
        let usage = match guarded(cancel, self.usage.usage(claim)).await? {
            Ok(usage) => usage,
            Err(e) => {
                warn!(pvc = %id, source = self.usage.source_name(), error = %e, "Invalid usage signal, skipping");
                return Some(ClaimOutcome::Skipped(SkipReason::UsageUnavailable(e)));
            }
        };

        if !exceeds_threshold(usage, policy.spec.threshold_percent) {
            debug!(pvc = %id, usage = %usage, threshold = policy.spec.threshold_percent, "Below threshold");
            return Some(ClaimOutcome::Skipped(SkipReason::BelowThreshold));
        }

        // EligibilityChecked
        let eligibility = guarded(cancel, self.eligibility.check(claim)).await?;
        match &eligibility {
            Eligibility::Eligible { .. } => {}
            Eligibility::NoStorageClass => {
                info!(pvc = %id, "PVC has no StorageClass, skipping");
                return Some(ClaimOutcome::Skipped(SkipReason::Ineligible(eligibility.clone())));
            }
            Eligibility::StorageClassNotFound { storage_class }
            | Eligibility::StorageClassUnavailable { storage_class, .. } => {
                warn!(pvc = %id, storage_class = %storage_class, "Failed to get StorageClass, skipping");
                return Some(ClaimOutcome::Skipped(SkipReason::Ineligible(eligibility.clone())));
            }
            Eligibility::ExpansionDisallowed { storage_class } => {
                info!(pvc = %id, storage_class = %storage_class, "StorageClass does not allow expansion, skipping");
                return Some(ClaimOutcome::Skipped(SkipReason::Ineligible(eligibility.clone())));
            }
        }

        // SizeComputed
        let Some(current_size) = current_storage_request(claim) else {
            warn!(pvc = %id, "PVC has no storage request, skipping");
            return Some(ClaimOutcome::Skipped(SkipReason::NoStorageRequest));
        };
        let new_size = match calculate_new_size(&current_size, policy.spec.increase_percent) {
            Ok(size) => size,
            Err(e) => {
                warn!(pvc = %id, size = %current_size.0, error = %e, "Unparseable storage request, skipping");
                return Some(ClaimOutcome::Skipped(SkipReason::InvalidSize(e.to_string())));
            }
        };

        // Applied
        let subject = claim.object_ref(&());
        match committed(cancel, self.executor.apply(claim, &new_size)).await? {
            Ok(()) => {
                info!(
                    pvc = %id,
                    old_size = %current_size.0,
                    new_size = %new_size.0,
                    "Resized PVC successfully"
                );
                self.sink
                    .publish(
                        &subject,
                        Notification::normal(
                            Reason::Resized,
                            format!("Resized from {} to {}", current_size.0, new_size.0),
                        ),
                    )
                    .await;
                Some(ClaimOutcome::Resized(ResizedClaim {
                    claim: id,
                    old_size: current_size,
                    new_size,
                }))
            }
            Err(e) => {
                error!(pvc = %id, new_size = %new_size.0, error = %e, "Failed to patch PVC");
                self.sink
                    .publish(&subject, Notification::warning(Reason::ResizeFailed, e.to_string()))
                    .await;
                Some(ClaimOutcome::Failed(FailedClaim {
                    claim: id,
                    new_size,
                    error: e.to_string(),
                    conflict: e.is_conflict(),
                }))
            }
        }
    }

    async fn publish_aggregates(&self, policy: &AutoResizePolicy, report: &ReconcileReport) {
        let subject = policy.object_ref(&());

        if !report.resized.is_empty() {
            let names: Vec<String> = report.resized.iter().map(|r| r.claim.to_string()).collect();
            self.sink
                .publish(
                    &subject,
                    Notification::normal(
                        Reason::PVCResized,
                        format!("Resized {} PVC(s): {}", names.len(), names.join(", ")),
                    ),
                )
                .await;
        }

        if !report.failed.is_empty() {
            let names: Vec<String> = report.failed.iter().map(|f| f.claim.to_string()).collect();
            self.sink
                .publish(
                    &subject,
                    Notification::warning(
                        Reason::ResizeFailed,
                        format!("{} PVC(s) failed: {}", names.len(), names.join(", ")),
                    ),
                )
                .await;
        }
    }
}

/// Current `spec.resources.requests.storage` of a claim
pub fn current_storage_request(claim: &PersistentVolumeClaim) -> Option<Quantity> {
    claim
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get(crate::domain::ports::STORAGE_RESOURCE)
        .cloned()
}

/// Race a store call against cancellation
async fn guarded<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Like [`guarded`], but a write that has already finished wins over a
/// cancellation raised during the same poll. A write aborted while still in
/// flight may have reached the store without being reported.
async fn committed<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        out = fut => Some(out),
        _ = cancel.cancelled() => None,
    }
}
