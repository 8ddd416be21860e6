//! `GET /metrics/validator`: staking state of one validator.
//!
//! The validator record is a prerequisite: it supplies the moniker label and
//! the consensus key the signing-info query is keyed by. If it cannot be
//! fetched, or its key cannot be turned into a consensus address, the request
//! fails with 502 before any other query starts.

use std::sync::Arc;

use axum::extract::{rejection::QueryRejection, Query, State};
use axum::response::Response;
use serde::Deserialize;

use chainscrape_core::address::{AddressKind, CosmosAddress};
use chainscrape_core::amount::Amount;
use chainscrape_core::error::ExporterError;
use chainscrape_core::normalize::{RawNumber, Scaling};

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::fanout::{RawSample, SourceQuery};
use crate::metric_set::GaugeDecl;
use crate::sources::ConsensusPubKey;

use super::{query_params, required, run_scrape};

const ROUTE: &str = "validator";
const PREREQUISITE: &str = "staking_validator";

pub(crate) static TOKENS: GaugeDecl = GaugeDecl {
    name: "cosmos_validator_tokens",
    help: "Tokens of the Cosmos-based blockchain validator",
    label_keys: &["address", "moniker"],
    scaling: Scaling::Denom,
};
pub(crate) static DELEGATORS_SHARES: GaugeDecl = GaugeDecl {
    name: "cosmos_validator_delegators_shares",
    help: "Delegators shares of the Cosmos-based blockchain validator",
    label_keys: &["address", "moniker"],
    scaling: Scaling::Denom,
};
pub(crate) static COMMISSION_RATE: GaugeDecl = GaugeDecl {
    name: "cosmos_validator_commission_rate",
    help: "Commission rate of the Cosmos-based blockchain validator",
    label_keys: &["address", "moniker"],
    scaling: Scaling::Unscaled,
};
pub(crate) static DELEGATIONS: GaugeDecl = GaugeDecl {
    name: "cosmos_validator_delegations",
    help: "Delegations of the Cosmos-based blockchain validator",
    label_keys: &["address", "moniker", "denom", "delegated_by"],
    scaling: Scaling::Denom,
};
pub(crate) static COMMISSION: GaugeDecl = GaugeDecl {
    name: "cosmos_validator_commission",
    help: "Commission of the Cosmos-based blockchain validator",
    label_keys: &["address", "moniker", "denom"],
    scaling: Scaling::Denom,
};
pub(crate) static UNBONDINGS: GaugeDecl = GaugeDecl {
    name: "cosmos_validator_unbondings",
    help: "Unbondings of the Cosmos-based blockchain validator",
    label_keys: &["address", "moniker", "denom", "unbonded_by"],
    scaling: Scaling::Denom,
};
pub(crate) static REDELEGATIONS: GaugeDecl = GaugeDecl {
    name: "cosmos_validator_redelegations",
    help: "Redelegations of the Cosmos-based blockchain validator",
    label_keys: &["address", "moniker", "denom", "redelegated_by", "redelegated_to"],
    scaling: Scaling::Denom,
};
pub(crate) static MISSED_BLOCKS: GaugeDecl = GaugeDecl {
    name: "cosmos_validator_missed_blocks",
    help: "Missed blocks of the Cosmos-based blockchain validator",
    label_keys: &["address", "moniker"],
    scaling: Scaling::Unscaled,
};

pub(crate) static GAUGES: &[&GaugeDecl] = &[
    &TOKENS,
    &DELEGATORS_SHARES,
    &COMMISSION_RATE,
    &DELEGATIONS,
    &COMMISSION,
    &UNBONDINGS,
    &REDELEGATIONS,
    &MISSED_BLOCKS,
];
static DELEGATIONS_ONLY: &[&GaugeDecl] = &[&DELEGATIONS];
static COMMISSION_ONLY: &[&GaugeDecl] = &[&COMMISSION];
static UNBONDINGS_ONLY: &[&GaugeDecl] = &[&UNBONDINGS];
static REDELEGATIONS_ONLY: &[&GaugeDecl] = &[&REDELEGATIONS];
static MISSED_ONLY: &[&GaugeDecl] = &[&MISSED_BLOCKS];

#[derive(Debug, Deserialize)]
pub struct ValidatorParams {
    pub address: Option<String>,
}

fn sum(entries: &[Amount]) -> Amount {
    entries.iter().fold(Amount::zero(), |acc, e| acc.add(e))
}

fn consensus_address(prefix: &str, key: &ConsensusPubKey) -> ApiResult<CosmosAddress> {
    let derived = match key {
        ConsensusPubKey::Ed25519(bytes) => CosmosAddress::consensus_from_ed25519(prefix, bytes),
        ConsensusPubKey::Unsupported(type_url) => Err(ExporterError::DecodeFailure(format!(
            "unsupported consensus key type {type_url}"
        ))),
        ConsensusPubKey::Missing => Err(ExporterError::DecodeFailure(
            "validator has no consensus key".into(),
        )),
    };
    derived.map_err(|e| {
        tracing::warn!(error = %e, "consensus address derivation failed");
        ApiError(ExporterError::PrerequisiteFailure(format!("consensus address: {e}")))
    })
}

pub async fn validator(
    State(state): State<AppState>,
    query: Result<Query<ValidatorParams>, QueryRejection>,
) -> Response {
    run_scrape(state, ROUTE, move |scrape| async move {
        let params = query_params(query)?;
        let prefix = scrape.cfg().chain.bech32_prefix.clone();
        let valoper = CosmosAddress::parse(
            required(&params.address, "address")?,
            &prefix,
            AddressKind::ValidatorOperator,
        )?
        .to_string();

        let chain = Arc::clone(&scrape.upstreams().chain);
        let info = scrape
            .prerequisite(PREREQUISITE, chain.validator(&valoper))
            .await?;
        let valcons = consensus_address(&prefix, &info.consensus_pubkey)?.to_string();

        let mut set = scrape.metric_set(GAUGES)?;
        let base = vec![valoper.clone(), info.moniker.clone()];

        set.set(PREREQUISITE, &TOKENS, &base, RawNumber::Integer(info.tokens.clone()));
        set.set(
            PREREQUISITE,
            &DELEGATORS_SHARES,
            &base,
            RawNumber::FixedPoint(info.delegator_shares.clone()),
        );
        set.set(
            PREREQUISITE,
            &COMMISSION_RATE,
            &base,
            RawNumber::FixedPoint(info.commission_rate.clone()),
        );

        let staking_denom = scrape.cfg().chain.denom.clone();
        let queries = vec![
            {
                let chain = Arc::clone(&chain);
                let valoper = valoper.clone();
                SourceQuery::new("staking_validator_delegations", DELEGATIONS_ONLY, base.clone(), async move {
                    let delegations = chain.validator_delegations(&valoper).await?;
                    Ok(delegations
                        .into_iter()
                        .map(|d| {
                            RawSample::new(
                                &DELEGATIONS,
                                vec![d.balance.denom, d.delegator_address],
                                RawNumber::Integer(d.balance.amount),
                            )
                        })
                        .collect())
                })
            },
            {
                let chain = Arc::clone(&chain);
                let valoper = valoper.clone();
                SourceQuery::new("distribution_validator_commission", COMMISSION_ONLY, base.clone(), async move {
                    let coins = chain.validator_commission(&valoper).await?;
                    Ok(coins
                        .into_iter()
                        .map(|c| RawSample::new(&COMMISSION, vec![c.denom], RawNumber::FixedPoint(c.amount)))
                        .collect())
                })
            },
            {
                let chain = Arc::clone(&chain);
                let valoper = valoper.clone();
                let denom = staking_denom.clone();
                SourceQuery::new("staking_validator_unbondings", UNBONDINGS_ONLY, base.clone(), async move {
                    let unbondings = chain.validator_unbondings(&valoper).await?;
                    Ok(unbondings
                        .into_iter()
                        .map(|u| {
                            RawSample::new(
                                &UNBONDINGS,
                                vec![denom.clone(), u.delegator_address],
                                RawNumber::Integer(sum(&u.entries)),
                            )
                        })
                        .collect())
                })
            },
            {
                let chain = Arc::clone(&chain);
                let valoper = valoper.clone();
                let denom = staking_denom;
                SourceQuery::new("staking_redelegations", REDELEGATIONS_ONLY, base.clone(), async move {
                    let redelegations = chain.validator_redelegations(&valoper).await?;
                    Ok(redelegations
                        .into_iter()
                        .map(|r| {
                            RawSample::new(
                                &REDELEGATIONS,
                                vec![denom.clone(), r.delegator_address, r.dst_validator_address],
                                RawNumber::Integer(sum(&r.entries)),
                            )
                        })
                        .collect())
                })
            },
            SourceQuery::new("slashing_signing_info", MISSED_ONLY, base, async move {
                let info = chain.signing_info(&valcons).await?;
                Ok(vec![RawSample::scalar(&MISSED_BLOCKS, RawNumber::Count(info.missed_blocks))])
            }),
        ];

        scrape.collect(set, queries).await
    })
    .await
}
