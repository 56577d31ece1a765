//! Observability: stage telemetry and sink abstractions.
//!
//! Events are recorded by the coordinating thread around each stage launch.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, EventState, StageCounters};
pub use sink::{
    MetricsEvent, MetricsSink, Stage, metrics_report, metrics_reset_all, with_metrics_sink,
};
