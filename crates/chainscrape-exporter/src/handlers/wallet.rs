//! `GET /metrics/gravity-bridge/wallet`: balances of an orchestrator pair.

use std::sync::Arc;

use axum::extract::{rejection::QueryRejection, Query, State};
use axum::response::Response;
use serde::Deserialize;

use chainscrape_core::address::{AddressKind, CosmosAddress, EvmAddress};
use chainscrape_core::normalize::{RawNumber, Scaling};

use crate::app_state::AppState;
use crate::fanout::{RawSample, SourceQuery};
use crate::metric_set::GaugeDecl;

use super::{query_params, required, run_scrape};

const ROUTE: &str = "gravity_bridge_wallet";

pub(crate) static COSMOS_BALANCE: GaugeDecl = GaugeDecl {
    name: "gravity_cudos_orchestrator_balance",
    help: "Balance of the Gravity Bridge orchestrator wallet on the Cosmos chain",
    label_keys: &["cudos_orchestrator_address", "ethereum_orchestrator_address", "denom"],
    scaling: Scaling::Denom,
};

pub(crate) static ETH_BALANCE: GaugeDecl = GaugeDecl {
    name: "gravity_ethereum_orchestrator_balance",
    help: "Balance of the Gravity Bridge orchestrator wallet on Ethereum",
    label_keys: &["cudos_orchestrator_address", "ethereum_orchestrator_address"],
    scaling: Scaling::Denom,
};

pub(crate) static GAUGES: &[&GaugeDecl] = &[&COSMOS_BALANCE, &ETH_BALANCE];
static COSMOS: &[&GaugeDecl] = &[&COSMOS_BALANCE];
static ETH: &[&GaugeDecl] = &[&ETH_BALANCE];

#[derive(Debug, Deserialize)]
pub struct WalletParams {
    pub cudos_orchestrator_address: Option<String>,
    pub ethereum_orchestrator_address: Option<String>,
}

pub async fn wallet(
    State(state): State<AppState>,
    query: Result<Query<WalletParams>, QueryRejection>,
) -> Response {
    run_scrape(state, ROUTE, move |scrape| async move {
        let params = query_params(query)?;
        let cosmos = CosmosAddress::parse(
            required(&params.cudos_orchestrator_address, "cudos_orchestrator_address")?,
            &scrape.cfg().chain.bech32_prefix,
            AddressKind::Account,
        )?;
        let eth = EvmAddress::parse(required(
            &params.ethereum_orchestrator_address,
            "ethereum_orchestrator_address",
        )?)?;

        let set = scrape.metric_set(GAUGES)?;
        let labels = vec![cosmos.to_string(), eth.to_string()];

        let chain = Arc::clone(&scrape.upstreams().chain);
        let evm = Arc::clone(&scrape.upstreams().evm);
        let holder = cosmos.to_string();

        let queries = vec![
            SourceQuery::new("bank_all_balances", COSMOS, labels.clone(), async move {
                let coins = chain.all_balances(&holder).await?;
                Ok(coins
                    .into_iter()
                    .map(|c| RawSample::new(&COSMOS_BALANCE, vec![c.denom], RawNumber::Integer(c.amount)))
                    .collect())
            }),
            SourceQuery::new("eth_get_balance", ETH, labels, async move {
                let wei = evm.balance_at(&eth).await?;
                Ok(vec![RawSample::scalar(&ETH_BALANCE, RawNumber::Integer(wei))])
            }),
        ];

        scrape.collect(set, queries).await
    })
    .await
}
