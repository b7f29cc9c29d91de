//! Custom Resource Definitions for the PVC Autoresizer
//!
//! - AutoResizePolicy: usage threshold and growth rate for a set of claims

pub mod auto_resize_policy;

pub use auto_resize_policy::*;
