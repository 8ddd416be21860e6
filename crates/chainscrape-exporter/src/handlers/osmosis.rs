//! `GET /metrics/osmosis`: balancer pool parameters and liquidity.
//!
//! `price_denoms` is an optional comma separated allow-list. When present,
//! per-denom gauges only carry the listed denoms; matching is exact.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{rejection::QueryRejection, Query, State};
use axum::response::Response;
use serde::Deserialize;

use chainscrape_core::error::ExporterError;
use chainscrape_core::normalize::{RawNumber, Scaling};

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::fanout::{RawSample, SourceQuery};
use crate::metric_set::GaugeDecl;

use super::{query_params, required, run_scrape};

const ROUTE: &str = "osmosis";

pub(crate) static SWAP_FEE: GaugeDecl = GaugeDecl {
    name: "osmosis_swap_fee",
    help: "Swap fee of the Osmosis pool",
    label_keys: &["pool_id"],
    scaling: Scaling::Unscaled,
};
pub(crate) static EXIT_FEE: GaugeDecl = GaugeDecl {
    name: "osmosis_exit_fee",
    help: "Exit fee of the Osmosis pool",
    label_keys: &["pool_id"],
    scaling: Scaling::Unscaled,
};
pub(crate) static POOL_WEIGHT: GaugeDecl = GaugeDecl {
    name: "osmosis_pool_weight",
    help: "Total weight of the Osmosis pool",
    label_keys: &["pool_id"],
    scaling: Scaling::Unscaled,
};
pub(crate) static ASSET_WEIGHT: GaugeDecl = GaugeDecl {
    name: "osmosis_pool_asset_weight",
    help: "Weight of one asset in the Osmosis pool",
    label_keys: &["pool_id", "denom"],
    scaling: Scaling::Unscaled,
};
pub(crate) static ASSET_AMOUNT: GaugeDecl = GaugeDecl {
    name: "osmosis_pool_asset_amount",
    help: "Amount of one asset held by the Osmosis pool",
    label_keys: &["pool_id", "denom"],
    scaling: Scaling::Unscaled,
};
pub(crate) static TOTAL_SHARES: GaugeDecl = GaugeDecl {
    name: "osmosis_total_pool_shares",
    help: "Total liquidity across Osmosis pools, per denom",
    label_keys: &["pool_id", "denom"],
    scaling: Scaling::Unscaled,
};

pub(crate) static GAUGES: &[&GaugeDecl] = &[
    &SWAP_FEE,
    &EXIT_FEE,
    &POOL_WEIGHT,
    &ASSET_WEIGHT,
    &ASSET_AMOUNT,
    &TOTAL_SHARES,
];
static FROM_POOL: &[&GaugeDecl] = &[&SWAP_FEE, &EXIT_FEE, &POOL_WEIGHT, &ASSET_WEIGHT, &ASSET_AMOUNT];
static FROM_LIQUIDITY: &[&GaugeDecl] = &[&TOTAL_SHARES];

#[derive(Debug, Deserialize)]
pub struct OsmosisParams {
    pub pool_id: Option<String>,
    pub price_denoms: Option<String>,
}

/// Denoms to keep; `None` keeps all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenomFilter(Option<BTreeSet<String>>);

impl DenomFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        let set: BTreeSet<String> = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
        if set.is_empty() {
            Self(None)
        } else {
            Self(Some(set))
        }
    }

    pub fn keeps(&self, denom: &str) -> bool {
        self.0.as_ref().map_or(true, |s| s.contains(denom))
    }
}

fn pool_id(raw: &str) -> ApiResult<u64> {
    Ok(raw
        .parse()
        .map_err(|e| ExporterError::InvalidInput(format!("pool_id {raw:?}: {e}")))?)
}

pub async fn osmosis(
    State(state): State<AppState>,
    query: Result<Query<OsmosisParams>, QueryRejection>,
) -> Response {
    run_scrape(state, ROUTE, move |scrape| async move {
        let params = query_params(query)?;
        let id = pool_id(required(&params.pool_id, "pool_id")?)?;
        let filter = DenomFilter::parse(params.price_denoms.as_deref());

        let set = scrape.metric_set(GAUGES)?;
        let labels = vec![id.to_string()];
        let pools = Arc::clone(&scrape.upstreams().pools);
        let liquidity = Arc::clone(&scrape.upstreams().pools);
        let pool_filter = filter.clone();

        let queries = vec![
            SourceQuery::new("gamm_pool", FROM_POOL, labels.clone(), async move {
                let pool = pools.pool(id).await?;
                let mut samples = vec![
                    RawSample::scalar(&SWAP_FEE, RawNumber::Decimal(pool.swap_fee)),
                    RawSample::scalar(&EXIT_FEE, RawNumber::Decimal(pool.exit_fee)),
                    RawSample::scalar(&POOL_WEIGHT, RawNumber::Decimal(pool.total_weight)),
                ];
                for asset in pool.assets.into_iter().filter(|a| pool_filter.keeps(&a.denom)) {
                    samples.push(RawSample::new(
                        &ASSET_WEIGHT,
                        vec![asset.denom.clone()],
                        RawNumber::Decimal(asset.weight),
                    ));
                    samples.push(RawSample::new(
                        &ASSET_AMOUNT,
                        vec![asset.denom],
                        RawNumber::Decimal(asset.amount),
                    ));
                }
                Ok(samples)
            }),
            SourceQuery::new("gamm_total_liquidity", FROM_LIQUIDITY, labels, async move {
                let coins = liquidity.total_liquidity().await?;
                Ok(coins
                    .into_iter()
                    .filter(|c| filter.keeps(&c.denom))
                    .map(|c| RawSample::new(&TOTAL_SHARES, vec![c.denom], RawNumber::Decimal(c.amount)))
                    .collect())
            }),
        ];

        scrape.collect(set, queries).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denom_filter_is_exact_and_trimmed() {
        let f = DenomFilter::parse(Some("uosmo, ibc/27394"));
        assert!(f.keeps("uosmo"));
        assert!(f.keeps("ibc/27394"));
        assert!(!f.keeps("osmo"));
        assert!(!f.keeps("uatom"));
    }

    #[test]
    fn empty_filter_keeps_everything() {
        assert!(DenomFilter::parse(None).keeps("anything"));
        assert!(DenomFilter::parse(Some(" , ")).keeps("anything"));
    }

    #[test]
    fn pool_id_must_be_numeric() {
        assert_eq!(pool_id("1").ok(), Some(1));
        assert!(pool_id("one").is_err());
        assert!(pool_id("-1").is_err());
    }
}
