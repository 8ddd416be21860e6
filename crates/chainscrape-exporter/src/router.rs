//! Axum router wiring.
//!
//! Scrape routes live under `/metrics/...`; `/metrics` itself serves the
//! exporter's own counters.

use axum::{routing::get, Router};

use crate::{app_state::AppState, handlers, ops};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics/gravity-bridge/wallet", get(handlers::wallet::wallet))
        .route("/metrics/gravity-bridge/contract", get(handlers::contract::contract))
        .route("/metrics/osmosis", get(handlers::osmosis::osmosis))
        .route("/metrics/status", get(handlers::status::status))
        .route("/metrics/validator", get(handlers::validator::validator))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
