//! AutoResizePolicy Controller
//!
//! Drives the reconciliation engine from a kube-runtime controller. Every
//! policy change triggers a pass, and each policy is re-evaluated on a fixed
//! resync interval so growing usage is picked up without policy edits.

use crate::config::OperatorConfig;
use crate::crd::AutoResizePolicy;
use crate::error::{Error, ErrorAction, Result};
use crate::metrics::Metrics;
use crate::resize::ReconciliationEngine;
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared state handed to every reconcile
pub struct Context {
    pub engine: ReconciliationEngine,
    pub metrics: Metrics,
    pub config: OperatorConfig,
    /// Cancelled on shutdown; aborts in-flight passes
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(
        engine: ReconciliationEngine,
        metrics: Metrics,
        config: OperatorConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            metrics,
            config,
            cancel,
        })
    }
}

/// Evaluate one policy and schedule the next resync
pub async fn reconcile(policy: Arc<AutoResizePolicy>, ctx: Arc<Context>) -> Result<Action> {
    let report = match ctx.engine.reconcile(&policy, &ctx.cancel).await {
        Ok(report) => report,
        Err(e) => {
            ctx.metrics.observe_error();
            return Err(e);
        }
    };

    ctx.metrics.observe_report(&report);
    info!(
        policy = %report.policy,
        candidates = report.candidates,
        resized = report.resized.len(),
        failed = report.failed.len(),
        skipped = report.skipped_total(),
        "Reconciliation pass complete"
    );

    if report.cancelled {
        return Ok(Action::await_change());
    }
    Ok(Action::requeue(ctx.config.resync_interval))
}

/// Map a failed pass to a requeue decision
pub fn error_policy(policy: Arc<AutoResizePolicy>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        policy = %policy.name_any(),
        namespace = ?policy.namespace(),
        error = %error,
        "Reconciliation failed"
    );
    requeue_action(error.action(), &ctx.config)
}

fn requeue_action(action: ErrorAction, config: &OperatorConfig) -> Action {
    match action {
        ErrorAction::RequeueWithBackoff => Action::requeue(config.error_backoff),
        ErrorAction::RequeueAfter(delay) => Action::requeue(delay),
        ErrorAction::NoRequeue => Action::await_change(),
    }
}

/// Run the controller until the context's token is cancelled
pub async fn run(client: Client, ctx: Arc<Context>) -> Result<()> {
    let policies: Api<AutoResizePolicy> = Api::all(client);

    if let Err(e) = policies.list(&ListParams::default().limit(1)).await {
        error!(error = %e, "AutoResizePolicy CRD is not queryable; is it installed?");
        return Err(e.into());
    }

    info!("Starting AutoResizePolicy controller");
    let shutdown = ctx.cancel.clone().cancelled_owned();

    Controller::new(policies, watcher::Config::default().any_semantic())
        .graceful_shutdown_on(shutdown)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(policy = %object.name, "Reconciled"),
                Err(e) => debug!(error = %e, "Reconcile did not complete"),
            }
        })
        .await;

    info!("AutoResizePolicy controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_requeue_actions() {
        let config = OperatorConfig::default();

        assert_eq!(
            requeue_action(ErrorAction::RequeueWithBackoff, &config),
            Action::requeue(Duration::from_secs(15))
        );
        assert_eq!(
            requeue_action(ErrorAction::RequeueAfter(Duration::from_secs(5)), &config),
            Action::requeue(Duration::from_secs(5))
        );
        assert_eq!(
            requeue_action(ErrorAction::NoRequeue, &config),
            Action::await_change()
        );
    }
}
