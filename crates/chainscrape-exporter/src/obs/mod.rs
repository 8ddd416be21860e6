//! Process-wide self-metrics of the exporter.
//!
//! These describe the exporter itself (scrapes served, upstream failures,
//! latency) and live for the whole process. Their label values are static
//! route/source names only, so cardinality stays bounded. Per-scrape chain
//! gauges never go here; see `metric_set`.

pub mod metrics;

pub use metrics::{ExporterMetrics, InflightGuard};
