pub mod metrics;
pub(crate) mod tracing;

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};

pub use self::metrics::Metrics;

/// Metrics registry plus the once-only tracing setup.
#[derive(Debug, Clone)]
pub struct Telemetry {
    registry: Registry,
    metrics: Arc<Metrics>,
}

impl Telemetry {
    /// Initializes tracing and registers the collectors.
    ///
    /// # Errors
    /// Fails when the subscriber cannot be installed or a metric cannot be registered.
    pub fn new() -> Result<Self> {
        tracing::init()?;
        Self::metrics_only()
    }

    /// Registers the collectors without touching the global subscriber.
    ///
    /// # Errors
    /// Fails when a metric cannot be registered.
    pub fn metrics_only() -> Result<Self> {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).context("failed to register metrics")?;
        Ok(Self {
            registry,
            metrics: Arc::new(metrics),
        })
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[must_use]
    pub fn metrics_arc(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn record_ready_probe(&self) {
        ::tracing::debug!("ready probe");
    }

    pub fn record_live_probe(&self) {
        ::tracing::debug!("live probe");
    }

    /// Text exposition of this registry's collectors.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(error) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            ::tracing::warn!(%error, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_collectors() {
        let telemetry = Telemetry::metrics_only().unwrap();
        telemetry.metrics().jobs_submitted.inc();
        let text = telemetry.render_prometheus();
        assert!(text.contains("shield_jobs_submitted_total 1"));
    }
}
