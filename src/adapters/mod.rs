//! Adapters implementing the domain ports
//!
//! - Kubernetes: claim store and event recorder over the API server
//! - Memory: in-process store and sink for tests and benchmarks
//! - Prometheus: usage source backed by kubelet volume stats

pub mod kubernetes;
pub mod memory;
pub mod prometheus_usage;

pub use kubernetes::*;
pub use memory::*;
pub use prometheus_usage::*;
