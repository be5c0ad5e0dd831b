// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the homesite controller.
//!
//! All metrics carry the namespace prefix `homesite_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Track reconciliation passes and their outcomes
//! - **Discovery Metrics** - Track valid and rejected websites
//! - **Website Lifecycle Metrics** - Track registration and routing writes
//!
//! # Example
//!
//! ```rust,no_run
//! use homesite::metrics::{gather_metrics, record_reconciliation_success};
//!
//! record_reconciliation_success(std::time::Duration::from_secs(1));
//! let text = gather_metrics().unwrap_or_default();
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all homesite metrics
const METRICS_NAMESPACE: &str = "homesite";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliation passes by status
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliation passes by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliation passes in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliation passes in seconds",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 4.0, 10.0, 30.0, 60.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Discovery Metrics
// ============================================================================

/// Number of websites found by the last discovery pass
///
/// Labels:
/// - `state`: `valid` or `invalid`
pub static WEBSITES: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_websites"),
        "Number of websites found by the last discovery pass by state",
    );
    let gauge = GaugeVec::new(opts, &["state"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total number of rejected website entries by reason
///
/// Labels:
/// - `reason`: Validation reason code (e.g., `TraversalRejected`)
pub static INVALID_WEBSITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_invalid_websites_total"),
        "Total number of rejected website entries by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Website Lifecycle Metrics
// ============================================================================

/// Total number of website operations by operation and status
///
/// Labels:
/// - `operation`: `create`, `update` or `delete`
/// - `status`: `success` or `error`
pub static WEBSITE_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_website_operations_total"),
        "Total number of website operations by operation and status",
    );
    let counter = CounterVec::new(opts, &["operation", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of routing synthesis batches by status
///
/// Labels:
/// - `status`: `success` or `error`
pub static SYNTHESIS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_synthesis_total"),
        "Total number of routing configuration batches written by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Record a successful reconciliation pass
///
/// # Arguments
/// * `duration` - Duration of the pass
pub fn record_reconciliation_success(duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&["success"]).inc();
    RECONCILIATION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a failed reconciliation pass
///
/// # Arguments
/// * `duration` - Duration of the pass before failure
pub fn record_reconciliation_error(duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&["error"]).inc();
    RECONCILIATION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record the outcome of a discovery pass
///
/// # Arguments
/// * `valid` - Number of valid websites
/// * `invalid_reasons` - Reason code of every rejected entry
pub fn record_discovery<'a>(valid: usize, invalid_reasons: impl IntoIterator<Item = &'a str>) {
    let mut invalid = 0_u32;
    for reason in invalid_reasons {
        INVALID_WEBSITES_TOTAL.with_label_values(&[reason]).inc();
        invalid += 1;
    }
    #[allow(clippy::cast_precision_loss)]
    let valid = valid as f64;
    WEBSITES.with_label_values(&["valid"]).set(valid);
    WEBSITES.with_label_values(&["invalid"]).set(f64::from(invalid));
}

/// Record a website operation
///
/// # Arguments
/// * `operation` - `create`, `update` or `delete`
/// * `success` - Whether the operation succeeded
pub fn record_website_operation(operation: &str, success: bool) {
    WEBSITE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status_label(success)])
        .inc();
}

/// Record a routing synthesis batch
///
/// # Arguments
/// * `success` - Whether the batch was written
pub fn record_synthesis(success: bool) {
    SYNTHESIS_TOTAL
        .with_label_values(&[status_label(success)])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Returns
/// Prometheus-formatted metrics as a String
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_success() {
        let before = RECONCILIATION_TOTAL.with_label_values(&["success"]).get();

        record_reconciliation_success(Duration::from_millis(500));

        let counter = RECONCILIATION_TOTAL.with_label_values(&["success"]);
        assert!(counter.get() > before);
        assert!(RECONCILIATION_DURATION_SECONDS.get_sample_count() > 0);
    }

    #[test]
    fn test_record_reconciliation_error() {
        record_reconciliation_error(Duration::from_millis(250));

        let counter = RECONCILIATION_TOTAL.with_label_values(&["error"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn test_record_discovery() {
        record_discovery(3, ["MetricsTestReason", "MetricsTestReason"]);

        let invalid = INVALID_WEBSITES_TOTAL.with_label_values(&["MetricsTestReason"]);
        assert!(invalid.get() >= 2.0);
    }

    #[test]
    fn test_record_website_operation_and_synthesis() {
        record_website_operation("create", false);
        record_synthesis(true);

        assert!(
            WEBSITE_OPERATIONS_TOTAL
                .with_label_values(&["create", "error"])
                .get()
                > 0.0
        );
        assert!(SYNTHESIS_TOTAL.with_label_values(&["success"]).get() > 0.0);
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation_success(Duration::from_millis(100));

        let metrics_text = gather_metrics().unwrap();

        assert!(
            metrics_text.contains("homesite_reconciliations_total"),
            "Metrics should contain reconciliation counter"
        );
    }
}
