//! `GET /metrics/gravity-bridge/contract`: token balance held by the bridge
//! contract. Both addresses come from config, so this route takes no input.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;

use chainscrape_core::normalize::{RawNumber, Scaling};

use crate::app_state::AppState;
use crate::fanout::{RawSample, SourceQuery};
use crate::metric_set::GaugeDecl;

use super::run_scrape;

const ROUTE: &str = "gravity_bridge_contract";

pub(crate) static CONTRACT_BALANCE: GaugeDecl = GaugeDecl {
    name: "gravity_ethereum_contract_balance",
    help: "ERC20 token balance held by the Gravity Bridge contract on Ethereum",
    label_keys: &[],
    scaling: Scaling::Denom,
};

pub(crate) static GAUGES: &[&GaugeDecl] = &[&CONTRACT_BALANCE];

pub async fn contract(State(state): State<AppState>) -> Response {
    run_scrape(state, ROUTE, |scrape| async move {
        let gravity = &scrape.cfg().gravity;
        let token = gravity.token()?;
        let bridge = gravity.bridge()?;

        let set = scrape.metric_set(GAUGES)?;
        let evm = Arc::clone(&scrape.upstreams().evm);

        let queries = vec![SourceQuery::new("erc20_balance_of", GAUGES, Vec::new(), async move {
            let balance = evm.erc20_balance_of(&token, &bridge).await?;
            Ok(vec![RawSample::scalar(&CONTRACT_BALANCE, RawNumber::Integer(balance))])
        })];

        scrape.collect(set, queries).await
    })
    .await
}
