//! Metrics definitions for the reconciler.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CYCLE_DURATION: MetricDef = MetricDef {
    name: "reconciler.cycle.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a reconciliation cycle in seconds",
};

pub const DESIRED_ENTRIES: MetricDef = MetricDef {
    name: "reconciler.cycle.entries",
    metric_type: MetricType::Gauge,
    description: "Number of entries published by the last cycle",
};

pub const STALE_KEYS_DELETED: MetricDef = MetricDef {
    name: "reconciler.stale_keys.deleted",
    metric_type: MetricType::Counter,
    description: "Number of stale keys removed from the store",
};

pub const SOURCE_FETCH_ERRORS: MetricDef = MetricDef {
    name: "reconciler.source.errors",
    metric_type: MetricType::Counter,
    description: "Number of failed reads against a source instance",
};

pub const STORE_ERRORS: MetricDef = MetricDef {
    name: "reconciler.store.errors",
    metric_type: MetricType::Counter,
    description: "Number of failed store operations",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CYCLE_DURATION,
    DESIRED_ENTRIES,
    STALE_KEYS_DELETED,
    SOURCE_FETCH_ERRORS,
    STORE_ERRORS,
];
