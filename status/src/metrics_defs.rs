//! Metrics definitions for the status surface.

use shared::metrics_defs::{MetricDef, MetricType};

pub const STATUS_PROBES: MetricDef = MetricDef {
    name: "status.probes",
    metric_type: MetricType::Counter,
    description: "Number of status probes, tagged by outcome",
};

pub const ALL_METRICS: &[MetricDef] = &[STATUS_PROBES];
