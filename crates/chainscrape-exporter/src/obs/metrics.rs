//! Exporter self-metrics on a long-lived `prometheus::Registry`.
//!
//! Label values are static route, source and failure-kind names, so the
//! number of series is fixed by the route table.

use std::sync::Arc;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

use chainscrape_core::error::{ExporterError, Result};

// 10ms .. 30s. Scrapes are bounded by upstream round trips.
const DURATION_BUCKETS: [f64; 9] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0, 30.0];

fn internal(e: prometheus::Error) -> ExporterError {
    ExporterError::Internal(format!("self-metrics: {e}"))
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, c: C) -> Result<C> {
    registry.register(Box::new(c.clone())).map_err(internal)?;
    Ok(c)
}

pub struct ExporterMetrics {
    registry: Registry,
    scrapes: IntCounterVec,
    source_failures: IntCounterVec,
    scrapes_inflight: IntGaugeVec,
    scrape_duration: HistogramVec,
    draining: IntGauge,
}

impl ExporterMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let scrapes = register(
            &registry,
            IntCounterVec::new(
                Opts::new("chainscrape_scrapes_total", "Scrapes served, by route and outcome."),
                &["route", "outcome"],
            )
            .map_err(internal)?,
        )?;
        let source_failures = register(
            &registry,
            IntCounterVec::new(
                Opts::new(
                    "chainscrape_source_failures_total",
                    "Upstream queries that left a gauge unset, by route, source and failure kind.",
                ),
                &["route", "source", "kind"],
            )
            .map_err(internal)?,
        )?;
        let scrapes_inflight = register(
            &registry,
            IntGaugeVec::new(
                Opts::new("chainscrape_scrapes_inflight", "Scrapes currently being served."),
                &["route"],
            )
            .map_err(internal)?,
        )?;
        let scrape_duration = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new(
                    "chainscrape_scrape_duration_seconds",
                    "End-to-end scrape latency.",
                )
                .buckets(DURATION_BUCKETS.to_vec()),
                &["route"],
            )
            .map_err(internal)?,
        )?;
        let draining = register(
            &registry,
            IntGauge::new("chainscrape_draining", "1 while the process is shutting down.")
                .map_err(internal)?,
        )?;

        Ok(Self {
            registry,
            scrapes,
            source_failures,
            scrapes_inflight,
            scrape_duration,
            draining,
        })
    }

    /// Mark draining state.
    pub fn set_draining(&self) {
        self.draining.set(1);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.get() != 0
    }

    /// Count a scrape as in flight until the guard drops.
    pub fn scrape_started(self: &Arc<Self>, route: &'static str) -> InflightGuard {
        self.scrapes_inflight.with_label_values(&[route]).inc();
        InflightGuard {
            metrics: Arc::clone(self),
            route,
        }
    }

    pub fn scrape_finished(&self, route: &str, outcome: &str, elapsed: Duration) {
        self.scrapes.with_label_values(&[route, outcome]).inc();
        self.scrape_duration
            .with_label_values(&[route])
            .observe(elapsed.as_secs_f64());
    }

    pub fn source_failed(&self, route: &str, source: &str, kind: &str) {
        self.source_failures
            .with_label_values(&[route, source, kind])
            .inc();
    }

    pub fn scrape_count(&self, route: &str, outcome: &str) -> u64 {
        self.scrapes.with_label_values(&[route, outcome]).get()
    }

    pub fn source_failure_count(&self, route: &str, source: &str, kind: &str) -> u64 {
        self.source_failures
            .with_label_values(&[route, source, kind])
            .get()
    }

    pub fn inflight(&self, route: &str) -> i64 {
        self.scrapes_inflight.with_label_values(&[route]).get()
    }

    /// Snapshot of every family for the text encoder.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

/// Decrements the in-flight gauge when a scrape ends, including when the
/// client disconnects and the handler future is dropped.
pub struct InflightGuard {
    metrics: Arc<ExporterMetrics>,
    route: &'static str,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.metrics
            .scrapes_inflight
            .with_label_values(&[self.route])
            .dec();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use prometheus::{Encoder, TextEncoder};

    use super::*;

    fn text(m: &ExporterMetrics) -> String {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&m.gather(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn renders_sorted_series_with_labels() {
        let m = ExporterMetrics::new().unwrap();
        m.source_failed("validator", "slashing_signing_info", "timed_out");
        m.source_failed("validator", "slashing_signing_info", "timed_out");
        m.source_failed("status", "tendermint_status", "source_unavailable");

        let out = text(&m);
        assert!(out.contains(
            "chainscrape_source_failures_total{kind=\"source_unavailable\",route=\"status\",source=\"tendermint_status\"} 1"
        ));
        assert!(out.contains(
            "chainscrape_source_failures_total{kind=\"timed_out\",route=\"validator\",source=\"slashing_signing_info\"} 2"
        ));
        assert_eq!(m.source_failure_count("validator", "slashing_signing_info", "timed_out"), 2);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let m = ExporterMetrics::new().unwrap();
        m.scrape_finished("status", "ok", Duration::from_millis(40));
        let out = text(&m);
        assert!(out.contains("chainscrape_scrape_duration_seconds_bucket{route=\"status\",le=\"0.01\"} 0"));
        assert!(out.contains("chainscrape_scrape_duration_seconds_bucket{route=\"status\",le=\"0.05\"} 1"));
        assert!(out.contains("chainscrape_scrape_duration_seconds_bucket{route=\"status\",le=\"+Inf\"} 1"));
        assert!(out.contains("chainscrape_scrape_duration_seconds_count{route=\"status\"} 1"));
        assert_eq!(m.scrape_count("status", "ok"), 1);
    }

    #[test]
    fn inflight_guard_decrements_on_drop() {
        let m = Arc::new(ExporterMetrics::new().unwrap());
        let g = m.scrape_started("wallet");
        assert_eq!(m.inflight("wallet"), 1);
        drop(g);
        assert_eq!(m.inflight("wallet"), 0);
    }

    #[test]
    fn draining_flag_is_a_gauge() {
        let m = ExporterMetrics::new().unwrap();
        assert!(text(&m).contains("chainscrape_draining 0"));
        m.set_draining();
        assert!(m.is_draining());
        assert!(text(&m).contains("chainscrape_draining 1"));
    }
}
