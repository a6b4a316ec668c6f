//! Prometheus counters for routing decisions.

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters owned by one orchestrator. Each instance has its own registry so
/// tests and multiple orchestrators never collide on registration.
pub struct RouterMetrics {
    registry: Registry,
    routes: IntCounterVec,
    fallbacks: IntCounterVec,
    tool_calls: IntCounter,
    tool_loop_exceeded: IntCounter,
    cancelled_routes: IntCounter,
}

impl RouterMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let routes = IntCounterVec::new(
            Opts::new("switchyard_routes_total", "Requests routed, by handling agent"),
            &["agent"],
        )?;
        let fallbacks = IntCounterVec::new(
            Opts::new(
                "switchyard_fallbacks_total",
                "Requests sent to the fallback agent, by reason",
            ),
            &["reason"],
        )?;
        let tool_calls = IntCounter::new("switchyard_tool_calls_total", "Tool calls executed")?;
        let tool_loop_exceeded = IntCounter::new(
            "switchyard_tool_loop_exceeded_total",
            "Tool loops that ran out of recursion budget",
        )?;
        let cancelled_routes = IntCounter::new(
            "switchyard_cancelled_routes_total",
            "Routes abandoned by the caller before history was written",
        )?;

        registry.register(Box::new(routes.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(tool_calls.clone()))?;
        registry.register(Box::new(tool_loop_exceeded.clone()))?;
        registry.register(Box::new(cancelled_routes.clone()))?;

        Ok(Self {
            registry,
            routes,
            fallbacks,
            tool_calls,
            tool_loop_exceeded,
            cancelled_routes,
        })
    }

    pub fn record_route(&self, agent: &str, tool_calls_made: u32) {
        self.routes.with_label_values(&[agent]).inc();
        self.tool_calls.inc_by(u64::from(tool_calls_made));
    }

    pub fn record_fallback(&self, reason: &str) {
        self.fallbacks.with_label_values(&[reason]).inc();
    }

    pub fn record_tool_loop_exceeded(&self) {
        self.tool_loop_exceeded.inc();
    }

    pub fn record_cancelled(&self) {
        self.cancelled_routes.inc();
    }

    pub fn routes_for(&self, agent: &str) -> u64 {
        self.routes.with_label_values(&[agent]).get()
    }

    pub fn fallbacks_for(&self, reason: &str) -> u64 {
        self.fallbacks.with_label_values(&[reason]).get()
    }

    pub fn tool_loop_exceeded(&self) -> u64 {
        self.tool_loop_exceeded.get()
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled_routes.get()
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .context("Failed to encode metrics")?;
        String::from_utf8(buf).context("Metrics output was not UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_in_text_format() {
        let metrics = RouterMetrics::new().unwrap();
        metrics.record_route("Order Management Agent", 2);
        metrics.record_fallback("low_confidence");
        metrics.record_tool_loop_exceeded();

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"switchyard_routes_total{agent="Order Management Agent"} 1"#));
        assert!(text.contains(r#"switchyard_fallbacks_total{reason="low_confidence"} 1"#));
        assert!(text.contains("switchyard_tool_calls_total 2"));
        assert!(text.contains("switchyard_tool_loop_exceeded_total 1"));
    }

    #[test]
    fn instances_are_independent() {
        let a = RouterMetrics::new().unwrap();
        let b = RouterMetrics::new().unwrap();
        a.record_cancelled();
        assert_eq!(a.cancelled(), 1);
        assert_eq!(b.cancelled(), 0);
    }
}
