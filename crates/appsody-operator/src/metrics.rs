//! Prometheus metrics for the reconcile loop

use crate::error::Result;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    failures: IntCounterVec,
    duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("reconciliations_total", "Reconciliations by result").namespace("appsody"),
            &["result"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new("reconcile_failures_total", "Failed reconciliations by reason")
                .namespace("appsody"),
            &["reason"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new("reconcile_duration_seconds", "Duration of reconciliations")
                .namespace("appsody")
                .buckets(DURATION_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            failures,
            duration,
        })
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.reconciliations.with_label_values(&["success"]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_failure(&self, reason: &str, elapsed: Duration) {
        self.reconciliations.with_label_values(&["error"]).inc();
        self.failures.with_label_values(&[reason]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}
