//! `GET /metrics/status`: liveness of the consensus node.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use chrono::Utc;

use chainscrape_core::normalize::{RawNumber, Scaling};

use crate::app_state::AppState;
use crate::fanout::{RawSample, SourceQuery};
use crate::metric_set::GaugeDecl;

use super::run_scrape;

const ROUTE: &str = "status";

pub(crate) static BLOCK_AGE: GaugeDecl = GaugeDecl {
    name: "block_age",
    help: "Age of the latest block in seconds",
    label_keys: &[],
    scaling: Scaling::Unscaled,
};

pub(crate) static MISSING_VALIDATORS: GaugeDecl = GaugeDecl {
    name: "missing_validators",
    help: "Number of missing validators for the latest block",
    label_keys: &[],
    scaling: Scaling::Unscaled,
};

pub(crate) static GAUGES: &[&GaugeDecl] = &[&BLOCK_AGE, &MISSING_VALIDATORS];
static AGE: &[&GaugeDecl] = &[&BLOCK_AGE];
static MISSING: &[&GaugeDecl] = &[&MISSING_VALIDATORS];

pub async fn status(State(state): State<AppState>) -> Response {
    run_scrape(state, ROUTE, |scrape| async move {
        let set = scrape.metric_set(GAUGES)?;
        let node = Arc::clone(&scrape.upstreams().consensus);
        let rounds = Arc::clone(&scrape.upstreams().consensus);

        let queries = vec![
            SourceQuery::new("tendermint_status", AGE, Vec::new(), async move {
                let status = node.status().await?;
                let age = Utc::now() - status.latest_block_time;
                let secs = age.num_milliseconds() as f64 / 1000.0;
                Ok(vec![RawSample::scalar(&BLOCK_AGE, RawNumber::Float(secs))])
            }),
            SourceQuery::new("tendermint_consensus_state", MISSING, Vec::new(), async move {
                let tally = rounds.consensus_state().await?;
                let missing = i64::try_from(tally.missing()).unwrap_or(i64::MAX);
                Ok(vec![RawSample::scalar(&MISSING_VALIDATORS, RawNumber::Count(missing))])
            }),
        ];

        scrape.collect(set, queries).await
    })
    .await
}
