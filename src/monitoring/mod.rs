//! Resource monitoring
//!
//! Samples this process's CPU and memory for prediction responses and the
//! registry, plus a whole-system snapshot for the health endpoint.

pub mod system;

pub use system::{ProcessUsage, ResourceMonitor, SystemSnapshot};
