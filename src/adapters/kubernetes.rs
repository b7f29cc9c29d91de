//! Kubernetes Adapters
//!
//! [`ClaimStore`] over the API server and [`NotificationSink`] over the
//! `events.k8s.io` recorder.

use crate::domain::ports::{ClaimPatch, ClaimStore, Notification, NotificationSink, Severity};
use crate::error::{Error, Result};
use crate::resize::selector::label_selector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Name the operator reports as field manager and event source
pub const CONTROLLER_NAME: &str = "pvc-autoresizer-operator";

// =============================================================================
// Claim Store
// =============================================================================

/// Claim store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClaimStore {
    client: Client,
    field_manager: String,
}

impl KubeClaimStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: CONTROLLER_NAME.to_string(),
        }
    }

    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn claims(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClaimStore for KubeClaimStore {
    async fn list_claims(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector(match_labels) {
            params = params.labels(&selector);
        }

        let list = self.claims(namespace).list(&params).await?;
        debug!(namespace, count = list.items.len(), "Listed PVCs");
        Ok(list.items)
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        Ok(self.claims(namespace).get_opt(name).await?)
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn patch_claim(&self, namespace: &str, name: &str, patch: &ClaimPatch) -> Result<()> {
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        let body = patch.to_merge_patch();

        match self
            .claims(namespace)
            .patch(name, &params, &Patch::Merge(&body))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 409 => Err(Error::Conflict {
                kind: "PersistentVolumeClaim".into(),
                name: format!("{}/{}", namespace, name),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Event Sink
// =============================================================================

/// Publishes notifications as Kubernetes events
#[derive(Clone)]
pub struct KubeEventSink {
    client: Client,
    reporter: Reporter,
}

impl KubeEventSink {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: CONTROLLER_NAME.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl NotificationSink for KubeEventSink {
    async fn publish(&self, subject: &ObjectReference, notification: Notification) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), subject.clone());
        let event = Event {
            type_: match notification.severity {
                Severity::Normal => EventType::Normal,
                Severity::Warning => EventType::Warning,
            },
            reason: notification.reason.to_string(),
            note: Some(notification.message),
            action: "Resize".into(),
            secondary: None,
        };

        if let Err(e) = recorder.publish(event).await {
            warn!(
                kind = ?subject.kind,
                name = ?subject.name,
                error = %e,
                "Failed to publish event"
            );
        }
    }
}
