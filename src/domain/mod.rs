//! Domain layer - Core port definitions
//!
//! This module defines the traits (ports) that adapters implement, keeping the
//! resize logic independent of the cluster it runs against.

pub mod ports;

pub use ports::*;
