//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `growthbook_controller_reconciliations_total` - Reconciliations by trigger
//! - `growthbook_controller_reconciliation_errors_total` - Failed reconciliations
//! - `growthbook_controller_reconciliation_duration_seconds` - Duration of a reconcile pass
//! - `growthbook_controller_store_writes_total` - Store writes by collection and outcome
//! - `growthbook_controller_requeues_total` - Scheduled requeues by reason
//! - `growthbook_controller_managed_resources` - Catalog size per Instance

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "growthbook_controller_reconciliations_total",
            "Total number of reconciliations by trigger source",
        ),
        &["trigger"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "growthbook_controller_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "growthbook_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static STORE_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "growthbook_controller_store_writes_total",
            "Total number of store writes by collection and operation",
        ),
        &["collection", "operation"],
    )
    .expect("Failed to create STORE_WRITES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "growthbook_controller_requeues_total",
            "Total number of scheduled requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static MANAGED_RESOURCES: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "growthbook_controller_managed_resources",
            "Number of child resources in the catalog of an Instance",
        ),
        &["instance"],
    )
    .expect("Failed to create MANAGED_RESOURCES metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STORE_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MANAGED_RESOURCES.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(trigger: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_store_writes(collection: &str, operation: &str) {
    STORE_WRITES_TOTAL
        .with_label_values(&[collection, operation])
        .inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

/// `instance` is the `namespace/name` key of the Instance
pub fn set_managed_resources(instance: &str, count: i64) {
    MANAGED_RESOURCES.with_label_values(&[instance]).set(count);
}

pub fn forget_managed_resources(instance: &str) {
    let _ = MANAGED_RESOURCES.remove_label_values(&[instance]);
}
