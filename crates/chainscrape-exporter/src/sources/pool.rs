//! Osmosis LCD (REST) adapter for balancer pools.
//!
//! Older LCD releases answer in camelCase, newer ones in snake_case; both
//! spellings are accepted.

use async_trait::async_trait;
use serde::Deserialize;

use chainscrape_core::error::Result;

use super::{http, Liquidity, Pool, PoolAsset, PoolQuery};

#[derive(Deserialize)]
struct PoolEnvelope {
    pool: PoolBody,
}

#[derive(Deserialize)]
struct PoolBody {
    #[serde(rename = "poolParams", alias = "pool_params")]
    pool_params: PoolParams,
    #[serde(rename = "totalWeight", alias = "total_weight")]
    total_weight: String,
    #[serde(rename = "poolAssets", alias = "pool_assets", default)]
    pool_assets: Vec<AssetBody>,
}

#[derive(Deserialize)]
struct PoolParams {
    #[serde(rename = "swapFee", alias = "swap_fee")]
    swap_fee: String,
    #[serde(rename = "exitFee", alias = "exit_fee")]
    exit_fee: String,
}

#[derive(Deserialize)]
struct AssetBody {
    token: CoinBody,
    weight: String,
}

#[derive(Deserialize)]
struct CoinBody {
    denom: String,
    amount: String,
}

#[derive(Deserialize)]
struct LiquidityEnvelope {
    #[serde(default)]
    liquidity: Vec<CoinBody>,
}

pub struct OsmosisLcd {
    client: reqwest::Client,
    base: String,
}

impl OsmosisLcd {
    pub fn new(client: reqwest::Client, base: &str) -> Self {
        Self {
            client,
            base: base.to_string(),
        }
    }
}

#[async_trait]
impl PoolQuery for OsmosisLcd {
    async fn pool(&self, id: u64) -> Result<Pool> {
        let url = http::join(&self.base, &format!("/osmosis/gamm/v1beta1/pools/{id}"));
        let env: PoolEnvelope = http::get_json(&self.client, &url).await?;
        let body = env.pool;
        Ok(Pool {
            swap_fee: body.pool_params.swap_fee,
            exit_fee: body.pool_params.exit_fee,
            total_weight: body.total_weight,
            assets: body
                .pool_assets
                .into_iter()
                .map(|a| PoolAsset {
                    denom: a.token.denom,
                    amount: a.token.amount,
                    weight: a.weight,
                })
                .collect(),
        })
    }

    async fn total_liquidity(&self) -> Result<Vec<Liquidity>> {
        let url = http::join(&self.base, "/osmosis/gamm/v1beta1/total_liquidity");
        let env: LiquidityEnvelope = http::get_json(&self.client, &url).await?;
        Ok(env
            .liquidity
            .into_iter()
            .map(|c| Liquidity {
                denom: c.denom,
                amount: c.amount,
            })
            .collect())
    }
}
