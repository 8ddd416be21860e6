//! Upstream data sources.
//!
//! Each upstream family sits behind an `async_trait` seam so handlers can be
//! exercised against in-memory fakes. Adapters own all protocol decoding and
//! return plain domain structs; transport errors never leave an adapter as
//! anything but an `ExporterError`.

pub mod consensus;
pub mod evm;
pub mod grpc;
mod http;
pub mod pool;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chainscrape_core::address::EvmAddress;
use chainscrape_core::amount::Amount;
use chainscrape_core::error::{ExporterError, Result};

use crate::config::ExporterConfig;

/// A bank balance in base units.
#[derive(Debug, Clone, PartialEq)]
pub struct Coin {
    pub denom: String,
    pub amount: Amount,
}

/// A `DecCoin`: amount is a Cosmos `Dec` string.
#[derive(Debug, Clone, PartialEq)]
pub struct DecCoin {
    pub denom: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusPubKey {
    Ed25519(Vec<u8>),
    /// Any other key type, identified by its type URL.
    Unsupported(String),
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorInfo {
    pub operator_address: String,
    pub moniker: String,
    pub tokens: Amount,
    /// `Dec` string.
    pub delegator_shares: String,
    /// `Dec` string.
    pub commission_rate: String,
    pub consensus_pubkey: ConsensusPubKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delegation {
    pub delegator_address: String,
    pub validator_address: String,
    pub balance: Coin,
}

/// Unbonding delegation; entry balances are in the staking denom.
#[derive(Debug, Clone, PartialEq)]
pub struct Unbonding {
    pub delegator_address: String,
    pub validator_address: String,
    pub entries: Vec<Amount>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redelegation {
    pub delegator_address: String,
    pub src_validator_address: String,
    pub dst_validator_address: String,
    pub entries: Vec<Amount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningInfo {
    pub missed_blocks: i64,
}

/// A balancer pool. Numbers are kept as the decimal strings the LCD returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub swap_fee: String,
    pub exit_fee: String,
    pub total_weight: String,
    pub assets: Vec<PoolAsset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolAsset {
    pub denom: String,
    pub amount: String,
    pub weight: String,
}

/// One entry of the chain-wide liquidity list.
#[derive(Debug, Clone, PartialEq)]
pub struct Liquidity {
    pub denom: String,
    pub amount: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStatus {
    pub latest_block_time: DateTime<Utc>,
}

/// Precommit votes of the first round at the current height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecommitTally {
    pub total: u64,
    pub signed: u64,
}

impl PrecommitTally {
    pub fn missing(&self) -> u64 {
        self.total.saturating_sub(self.signed)
    }
}

/// Cosmos SDK gRPC queries.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    async fn all_balances(&self, address: &str) -> Result<Vec<Coin>>;
    async fn validator(&self, valoper: &str) -> Result<ValidatorInfo>;
    async fn validator_delegations(&self, valoper: &str) -> Result<Vec<Delegation>>;
    async fn validator_commission(&self, valoper: &str) -> Result<Vec<DecCoin>>;
    async fn validator_unbondings(&self, valoper: &str) -> Result<Vec<Unbonding>>;
    async fn validator_redelegations(&self, valoper: &str) -> Result<Vec<Redelegation>>;
    async fn signing_info(&self, valcons: &str) -> Result<SigningInfo>;
}

/// Ethereum JSON-RPC reads at the latest block.
#[async_trait]
pub trait EvmQuery: Send + Sync {
    async fn balance_at(&self, address: &EvmAddress) -> Result<Amount>;
    async fn erc20_balance_of(&self, token: &EvmAddress, holder: &EvmAddress) -> Result<Amount>;
}

/// Osmosis LCD pool endpoints.
#[async_trait]
pub trait PoolQuery: Send + Sync {
    async fn pool(&self, id: u64) -> Result<Pool>;
    async fn total_liquidity(&self) -> Result<Vec<Liquidity>>;
}

/// CometBFT RPC node endpoints.
#[async_trait]
pub trait ConsensusQuery: Send + Sync {
    async fn status(&self) -> Result<NodeStatus>;
    async fn consensus_state(&self) -> Result<PrecommitTally>;
}

/// Long-lived upstream handles, built once at startup and shared read-only.
#[derive(Clone)]
pub struct Upstreams {
    pub chain: Arc<dyn ChainQuery>,
    pub evm: Arc<dyn EvmQuery>,
    pub pools: Arc<dyn PoolQuery>,
    pub consensus: Arc<dyn ConsensusQuery>,
}

impl Upstreams {
    /// Build every client from config. Nothing connects here: the gRPC
    /// channel is lazy and HTTP clients open connections on first use.
    pub fn connect(cfg: &ExporterConfig) -> Result<Self> {
        let timeout = cfg.timeouts.upstream();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExporterError::Config(format!("http client: {e}")))?;

        let chain = grpc::GrpcChain::connect_lazy(&cfg.upstreams.grpc_url, timeout)?;
        let evm = evm::EthRpc::new(http.clone(), &cfg.upstreams.eth_rpc_url);
        let pools = pool::OsmosisLcd::new(http.clone(), &cfg.upstreams.osmosis_lcd_url);
        let consensus = consensus::TendermintRpc::new(http, &cfg.upstreams.tendermint_rpc_url);

        tracing::info!(
            grpc = %cfg.upstreams.grpc_url,
            tendermint = %cfg.upstreams.tendermint_rpc_url,
            eth = %cfg.upstreams.eth_rpc_url,
            osmosis = %cfg.upstreams.osmosis_lcd_url,
            "upstream clients ready"
        );

        Ok(Self {
            chain: Arc::new(chain),
            evm: Arc::new(evm),
            pools: Arc::new(pools),
            consensus: Arc::new(consensus),
        })
    }
}
