//! Metrics for the routing core. Logging goes through `tracing` directly.

pub mod metrics;

pub use metrics::RouterMetrics;
