use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use chainscrape_core::address::EvmAddress;
use chainscrape_core::error::{ExporterError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub upstreams: UpstreamSection,

    pub chain: ChainSection,

    pub gravity: GravitySection,

    #[serde(default)]
    pub timeouts: TimeoutSection,

    /// Labels attached to every gauge of every scrape (e.g. `network`).
    #[serde(default)]
    pub const_labels: BTreeMap<String, String>,
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ExporterError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.server.validate()?;
        self.upstreams.validate()?;
        self.chain.validate()?;
        self.gravity.validate()?;
        self.timeouts.validate()?;

        for name in self.const_labels.keys() {
            if !is_label_name(name) {
                return Err(ExporterError::Config(format!(
                    "const_labels: {name:?} is not a valid label name"
                )));
            }
        }

        Ok(())
    }
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    head_ok && !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            ExporterError::Config(format!("server.listen {:?} is not a socket address: {e}", self.listen))
        })
    }
}

fn default_listen() -> String {
    "0.0.0.0:3000".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSection {
    /// Cosmos SDK gRPC endpoint (bank, staking, distribution, slashing).
    #[serde(default = "default_grpc_url")]
    pub grpc_url: String,

    /// Tendermint / CometBFT RPC (`/status`, `/consensus_state`).
    #[serde(default = "default_tendermint_rpc_url")]
    pub tendermint_rpc_url: String,

    /// Ethereum JSON-RPC.
    #[serde(default = "default_eth_rpc_url")]
    pub eth_rpc_url: String,

    /// Osmosis LCD REST.
    #[serde(default = "default_osmosis_lcd_url")]
    pub osmosis_lcd_url: String,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            grpc_url: default_grpc_url(),
            tendermint_rpc_url: default_tendermint_rpc_url(),
            eth_rpc_url: default_eth_rpc_url(),
            osmosis_lcd_url: default_osmosis_lcd_url(),
        }
    }
}

impl UpstreamSection {
    pub fn validate(&self) -> Result<()> {
        for (field, url) in [
            ("upstreams.grpc_url", &self.grpc_url),
            ("upstreams.tendermint_rpc_url", &self.tendermint_rpc_url),
            ("upstreams.eth_rpc_url", &self.eth_rpc_url),
            ("upstreams.osmosis_lcd_url", &self.osmosis_lcd_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ExporterError::Config(format!(
                    "{field} must be an http(s) url, got {url:?}"
                )));
            }
        }
        // The gRPC channel is built without TLS support.
        if !self.grpc_url.starts_with("http://") {
            return Err(ExporterError::Config(format!(
                "upstreams.grpc_url must be a plaintext http:// endpoint, got {:?}",
                self.grpc_url
            )));
        }
        Ok(())
    }
}

fn default_grpc_url() -> String {
    "http://127.0.0.1:9090".into()
}
fn default_tendermint_rpc_url() -> String {
    "http://127.0.0.1:26657".into()
}
fn default_eth_rpc_url() -> String {
    "http://127.0.0.1:8545".into()
}
fn default_osmosis_lcd_url() -> String {
    "https://lcd-osmosis.blockapsis.com".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSection {
    /// Account bech32 prefix; validator prefixes derive from it.
    pub bech32_prefix: String,

    /// Staking denom, used where the chain omits it (unbondings, redelegations).
    pub denom: String,

    /// Base units per display unit.
    #[serde(default = "default_denom_coefficient")]
    pub denom_coefficient: f64,
}

impl ChainSection {
    pub fn validate(&self) -> Result<()> {
        if self.bech32_prefix.is_empty()
            || !self
                .bech32_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ExporterError::Config(
                "chain.bech32_prefix must be non-empty lowercase alphanumeric".into(),
            ));
        }
        if self.denom.is_empty() {
            return Err(ExporterError::Config("chain.denom must not be empty".into()));
        }
        if !self.denom_coefficient.is_finite() || self.denom_coefficient <= 0.0 {
            return Err(ExporterError::Config(
                "chain.denom_coefficient must be a positive number".into(),
            ));
        }
        Ok(())
    }
}

fn default_denom_coefficient() -> f64 {
    1e18
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GravitySection {
    /// ERC20 token whose bridge holdings are reported.
    pub token_contract: String,
    /// Gravity bridge contract holding the tokens.
    pub bridge_contract: String,
}

impl GravitySection {
    pub fn validate(&self) -> Result<()> {
        self.token()?;
        self.bridge()?;
        Ok(())
    }

    pub fn token(&self) -> Result<EvmAddress> {
        EvmAddress::parse(&self.token_contract)
            .map_err(|e| ExporterError::Config(format!("gravity.token_contract: {e}")))
    }

    pub fn bridge(&self) -> Result<EvmAddress> {
        EvmAddress::parse(&self.bridge_contract)
            .map_err(|e| ExporterError::Config(format!("gravity.bridge_contract: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSection {
    /// Bound on every single upstream call.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// Bound on a whole scrape; pending queries are abandoned past it.
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            upstream_timeout_ms: default_upstream_timeout_ms(),
            request_deadline_ms: default_request_deadline_ms(),
        }
    }
}

impl TimeoutSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=60_000).contains(&self.upstream_timeout_ms) {
            return Err(ExporterError::Config(
                "timeouts.upstream_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if !(100..=120_000).contains(&self.request_deadline_ms) {
            return Err(ExporterError::Config(
                "timeouts.request_deadline_ms must be between 100 and 120000".into(),
            ));
        }
        if self.request_deadline_ms < self.upstream_timeout_ms {
            return Err(ExporterError::Config(
                "timeouts.request_deadline_ms must not be lower than upstream_timeout_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn upstream(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

fn default_upstream_timeout_ms() -> u64 {
    5000
}
fn default_request_deadline_ms() -> u64 {
    10000
}
