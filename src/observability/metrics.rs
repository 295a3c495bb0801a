//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `app_gateway_reconciliations_total` - Total number of reconciliations
//! - `app_gateway_reconciliation_errors_total` - Total number of reconciliation errors
//! - `app_gateway_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `app_gateway_requeues_total` - Requeues by reason
//! - `app_gateway_admission_requests_total` - Admission requests by operation and outcome
//! - `app_gateway_config_resolutions_total` - Configuration resolutions by outcome
//! - `app_gateway_oidc_registrations_total` - OIDC clients registered
//! - `app_gateway_http_requests_total` - Outbound HTTP requests by method and status

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "app_gateway_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "app_gateway_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "app_gateway_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("app_gateway_requeues_total", "Total number of requeues by reason"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static ADMISSION_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "app_gateway_admission_requests_total",
            "Total number of admission requests by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create ADMISSION_REQUESTS_TOTAL metric - this should never happen")
});

static CONFIG_RESOLUTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "app_gateway_config_resolutions_total",
            "Total number of configuration resolutions by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create CONFIG_RESOLUTIONS_TOTAL metric - this should never happen")
});

static OIDC_REGISTRATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "app_gateway_oidc_registrations_total",
        "Total number of OIDC clients registered",
    )
    .expect("Failed to create OIDC_REGISTRATIONS_TOTAL metric - this should never happen")
});

static HTTP_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "app_gateway_http_requests_total",
            "Total number of outbound HTTP requests by method and status",
        ),
        &["method", "status"],
    )
    .expect("Failed to create HTTP_REQUESTS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMISSION_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFIG_RESOLUTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OIDC_REGISTRATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_admission_requests(operation: &str, outcome: &str) {
    ADMISSION_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn increment_config_resolutions(outcome: &str) {
    CONFIG_RESOLUTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_oidc_registrations() {
    OIDC_REGISTRATIONS_TOTAL.inc();
}

pub fn increment_http_requests(method: &str, status: &str) {
    HTTP_REQUESTS_TOTAL.with_label_values(&[method, status]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert!(after > before, "counter should grow: {before} -> {after}");
    }

    #[test]
    fn test_increment_reconciliation_errors() {
        let before = RECONCILIATION_ERRORS_TOTAL.get();
        increment_reconciliation_errors();
        let after = RECONCILIATION_ERRORS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(1.5);
        // Just verify it doesn't panic - histogram observation doesn't return a value
    }

    #[test]
    fn test_labelled_counters() {
        let before = ADMISSION_REQUESTS_TOTAL
            .with_label_values(&["CREATE", "patched"])
            .get();
        increment_admission_requests("CREATE", "patched");
        assert!(
            ADMISSION_REQUESTS_TOTAL
                .with_label_values(&["CREATE", "patched"])
                .get()
                > before
        );

        let before = CONFIG_RESOLUTIONS_TOTAL.with_label_values(&["fetch"]).get();
        increment_config_resolutions("fetch");
        assert!(CONFIG_RESOLUTIONS_TOTAL.with_label_values(&["fetch"]).get() > before);
    }
}
