//! PVC Autoresizer Operator
//!
//! A Kubernetes operator that keeps PersistentVolumeClaim sizes ahead of
//! observed usage. An `AutoResizePolicy` names a usage threshold, a growth
//! percentage and a label selector; every pass grows the selected claims whose
//! usage has reached the threshold and whose storage class allows expansion.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                  AutoResizePolicy Controller (kube-runtime)          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                        Reconciliation Engine                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌──────────┐  │
//! │  │    Claim     │─▶│    Usage     │─▶│  Expansion   │─▶│  Size    │  │
//! │  │   Selector   │  │  Evaluator   │  │ Eligibility  │  │  Calc    │  │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └────┬─────┘  │
//! │                                                             │        │
//! │                                              ┌──────────────▼─────┐  │
//! │                                              │  Resize Executor   │  │
//! │                                              │ (conditional patch)│  │
//! │                                              └────────────────────┘  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                              Ports                                   │
//! │   ClaimStore (API server)   NotificationSink (Events)   UsageSource  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`resize`]: Decision and execution algorithm
//! - [`domain`]: Port traits and value types
//! - [`adapters`]: Kubernetes, in-memory and Prometheus implementations
//! - [`controller`]: kube-runtime wiring
//! - [`crd`]: Custom Resource Definitions
//! - [`error`]: Error types and handling

pub mod adapters;
pub mod config;
pub mod controller;
pub mod crd;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod resize;

// Re-export commonly used types
pub use adapters::{
    InMemoryClusterStore, KubeClaimStore, KubeEventSink, PrometheusConfig, PrometheusUsageSource,
    RecordingSink,
};

pub use config::OperatorConfig;

pub use crd::{AutoResizePolicy, AutoResizePolicySpec, PolicySelector};

pub use domain::ports::{
    ClaimId, ClaimPatch, ClaimStore, Notification, NotificationSink, Reason, Severity,
    UsageError, UsagePercent, UsageSource,
};

pub use error::{Error, ErrorAction, Result};

pub use metrics::Metrics;

pub use resize::{
    AnnotationUsageSource, ClaimOutcome, FailedClaim, ReconcileReport, ReconciliationEngine,
    ResizedClaim, SkipReason,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
