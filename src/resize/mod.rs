//! Resize decision and execution
//!
//! Leaf-first:
//! - [`quantity`]: size arithmetic on Kubernetes quantities
//! - [`eligibility`]: storage class expansion gate
//! - [`usage`]: usage signal parsing and threshold check
//! - [`selector`]: candidate claim resolution
//! - [`executor`]: conditional storage-request patch
//! - [`engine`]: per-policy orchestration and notifications

pub mod eligibility;
pub mod engine;
pub mod executor;
pub mod quantity;
pub mod selector;
pub mod usage;

pub use eligibility::{Eligibility, ExpansionEligibilityChecker};
pub use engine::{
    ClaimOutcome, FailedClaim, ReconcileReport, ReconciliationEngine, ResizedClaim, SkipReason,
};
pub use executor::ResizeExecutor;
pub use quantity::{calculate_new_size, format_binary_si, grow_bytes, parse_quantity_bytes};
pub use selector::ClaimSelector;
pub use usage::{AnnotationUsageSource, DEFAULT_USAGE_ANNOTATION};
