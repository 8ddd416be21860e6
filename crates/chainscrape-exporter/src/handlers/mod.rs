//! Per-route scrape handlers.
//!
//! Every route follows the same lifecycle:
//! validate -> optional prerequisite -> fan-out -> join -> build -> render.
//! Only invalid input and a failed prerequisite end it early; everything
//! else produces a (possibly partial) 200.

pub mod contract;
pub mod osmosis;
pub mod status;
pub mod validator;
pub mod wallet;

use std::future::Future;

use axum::extract::{rejection::QueryRejection, Query};
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use chainscrape_core::error::{ExporterError, Result};

use crate::app_state::AppState;
use crate::config::ExporterConfig;
use crate::error::{ApiError, ApiResult};
use crate::exposition;
use crate::fanout::{FanOut, SourceQuery};
use crate::metric_set::{GaugeDecl, MetricSet};
use crate::sources::Upstreams;

/// Every gauge any route can emit.
pub fn all_gauges() -> impl Iterator<Item = &'static GaugeDecl> {
    [
        wallet::GAUGES,
        contract::GAUGES,
        osmosis::GAUGES,
        status::GAUGES,
        validator::GAUGES,
    ]
    .into_iter()
    .flatten()
    .copied()
}

/// Rendered response plus how many values went missing.
pub(crate) struct Scraped {
    response: Response,
    failures: usize,
}

/// Per-request context handed to a route body.
pub(crate) struct Scrape {
    state: AppState,
    route: &'static str,
    fanout: FanOut,
}

impl Scrape {
    fn new(state: AppState, route: &'static str) -> Self {
        let t = &state.cfg().timeouts;
        let fanout = FanOut::new(t.upstream(), t.request_deadline());
        Self {
            state,
            route,
            fanout,
        }
    }

    pub fn cfg(&self) -> &ExporterConfig {
        self.state.cfg()
    }

    pub fn upstreams(&self) -> &Upstreams {
        self.state.upstreams()
    }

    pub fn metric_set(&self, decls: &[&'static GaugeDecl]) -> ApiResult<MetricSet> {
        Ok(MetricSet::new(
            self.state.normalizer(),
            &self.state.cfg().const_labels,
            decls,
        )?)
    }

    /// Run a lookup the query plan depends on. Any failure, including the
    /// timeout, aborts the request before a single query is spawned.
    pub async fn prerequisite<T, F>(&self, what: &str, fut: F) -> ApiResult<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let bound = self.fanout.bound();
        let res = match tokio::time::timeout(bound, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(ExporterError::PrerequisiteFailure(format!("{what}: {e}"))),
            Err(_) => Err(ExporterError::PrerequisiteFailure(format!(
                "{what}: no response within {}ms",
                bound.as_millis()
            ))),
        };
        let elapsed_secs = started.elapsed().as_secs_f64();
        match &res {
            Ok(_) => tracing::debug!(what, elapsed_secs, "prerequisite finished"),
            Err(e) => tracing::warn!(what, elapsed_secs, error = %e, "prerequisite failed"),
        }
        Ok(res?)
    }

    /// Fan out, fold every outcome into `set`, render.
    pub async fn collect(self, mut set: MetricSet, queries: Vec<SourceQuery>) -> ApiResult<Scraped> {
        let completed = self.fanout.run(queries).await;
        for done in completed {
            set.apply(done);
        }

        let metrics = self.state.metrics();
        for f in set.failures() {
            metrics.source_failed(self.route, f.source, f.kind.as_str());
        }
        let failures = set.failures().len();
        let response = exposition::render(set)?;
        Ok(Scraped { response, failures })
    }
}

/// Wrap a route body with the request span, the in-flight gauge, the
/// outcome counter and the final log record.
pub(crate) async fn run_scrape<F, Fut>(state: AppState, route: &'static str, body: F) -> Response
where
    F: FnOnce(Scrape) -> Fut,
    Fut: Future<Output = ApiResult<Scraped>>,
{
    let span = tracing::info_span!("scrape", route, request_id = %Uuid::new_v4());
    async move {
        let started = Instant::now();
        let metrics = state.metrics().clone();
        let _inflight = metrics.scrape_started(route);

        let result = body(Scrape::new(state, route)).await;

        let elapsed = started.elapsed();
        let (outcome, response) = match result {
            Ok(s) if s.failures == 0 => ("ok", s.response),
            Ok(s) => ("partial", s.response),
            Err(e) => (e.outcome(), e.into_response()),
        };
        metrics.scrape_finished(route, outcome, elapsed);
        tracing::info!(outcome, elapsed_secs = elapsed.as_secs_f64(), "request processed");
        response
    }
    .instrument(span)
    .await
}

/// Unwrap the extracted query string. A malformed one (a duplicated key, a
/// non-string value) is invalid input like any other bad parameter.
pub(crate) fn query_params<T>(query: std::result::Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    query.map(|Query(params)| params).map_err(|e| {
        ApiError(ExporterError::InvalidInput(format!(
            "query string: {}",
            e.body_text()
        )))
    })
}

/// A query parameter that must be present and non-empty.
pub(crate) fn required<'a>(value: &'a Option<String>, name: &str) -> ApiResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError(ExporterError::InvalidInput(format!(
            "missing query parameter {name}"
        )))),
    }
}
