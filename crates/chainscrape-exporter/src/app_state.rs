//! Shared application state.
//!
//! Holds only what is safe to share between concurrent scrapes: the
//! validated config, read-only upstream handles, the normalizer and the
//! process-wide self-metrics. Per-scrape data never lives here.

use std::sync::Arc;

use chainscrape_core::error::{ExporterError, Result};
use chainscrape_core::normalize::Normalizer;

use crate::config::ExporterConfig;
use crate::handlers;
use crate::obs::ExporterMetrics;
use crate::sources::Upstreams;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ExporterConfig,
    upstreams: Upstreams,
    normalizer: Normalizer,
    metrics: Arc<ExporterMetrics>,
}

impl AppState {
    /// Build real upstream clients from config.
    pub fn new(cfg: ExporterConfig) -> Result<Self> {
        let upstreams = Upstreams::connect(&cfg)?;
        Self::with_upstreams(cfg, upstreams)
    }

    /// Build state around caller-provided upstreams (tests, embedding).
    pub fn with_upstreams(cfg: ExporterConfig, upstreams: Upstreams) -> Result<Self> {
        let normalizer = Normalizer::new(cfg.chain.denom_coefficient)?;

        // A const label sharing a name with a gauge's own label would make
        // every scrape of that route fail, so refuse it at boot.
        for decl in handlers::all_gauges() {
            if let Some(clash) = decl
                .label_keys
                .iter()
                .find(|k| cfg.const_labels.contains_key(**k))
            {
                return Err(ExporterError::Config(format!(
                    "const_labels.{clash} collides with a label of {}",
                    decl.name
                )));
            }
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                upstreams,
                normalizer,
                metrics: Arc::new(ExporterMetrics::new()?),
            }),
        })
    }

    pub fn cfg(&self) -> &ExporterConfig {
        &self.inner.cfg
    }

    pub fn upstreams(&self) -> &Upstreams {
        &self.inner.upstreams
    }

    pub fn normalizer(&self) -> Normalizer {
        self.inner.normalizer
    }

    pub fn metrics(&self) -> &Arc<ExporterMetrics> {
        &self.inner.metrics
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    pub fn set_draining(&self) {
        self.inner.metrics.set_draining()
    }
}
