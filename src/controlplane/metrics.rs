//! Reconcile metrics
//!
//! Counters live on a registry owned by the process rather than the
//! prometheus default registry, so tests can build as many as they like.

use crate::error::{Error, Result};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics recorded by the managed resource controllers.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Reconciles started, by kind
    pub reconciliations: IntCounterVec,
    /// Failed reconciles, by kind and error kind
    pub failures: IntCounterVec,
    /// Calls that changed Cloudian, by kind and operation
    pub external_operations: IntCounterVec,
    /// Reconcile duration, by kind
    pub reconcile_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("provider_cloudian".to_string()), None)?;

        let reconciliations = IntCounterVec::new(
            Opts::new("reconciliations_total", "Reconciles started"),
            &["kind"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new("reconcile_failures_total", "Reconciles that returned an error"),
            &["kind", "error"],
        )?;
        let external_operations = IntCounterVec::new(
            Opts::new(
                "external_operations_total",
                "Create, update and delete calls against Cloudian",
            ),
            &["kind", "operation"],
        )?;
        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new("reconcile_duration_seconds", "Duration of a reconcile"),
            &["kind"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(external_operations.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            failures,
            external_operations,
            reconcile_duration,
        })
    }

    /// Render every metric in the prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics are not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.reconciliations.with_label_values(&["Group"]).inc();
        metrics
            .failures
            .with_label_values(&["User", "policy_violation"])
            .inc_by(2);

        let text = metrics.encode().unwrap();

        assert!(text.contains(r#"provider_cloudian_reconciliations_total{kind="Group"} 1"#));
        assert!(text.contains(
            r#"provider_cloudian_reconcile_failures_total{error="policy_violation",kind="User"} 2"#
        ));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.reconciliations.with_label_values(&["Group"]).inc();

        assert!(!second.encode().unwrap().contains(r#"kind="Group""#));
    }
}
