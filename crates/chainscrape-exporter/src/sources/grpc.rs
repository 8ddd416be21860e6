//! Cosmos SDK gRPC adapter (bank, staking, distribution, slashing).
//!
//! One lazily connected `Channel` is shared by every query client; tonic
//! clones are cheap handles onto the same connection. Message conversion and
//! the pagination loop are plain functions so they can be tested without a
//! node.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use tonic::transport::{Channel, Endpoint};

use cosmos_sdk_proto::cosmos::bank::v1beta1::{
    query_client::QueryClient as BankClient, QueryAllBalancesRequest,
};
use cosmos_sdk_proto::cosmos::base::query::v1beta1::{PageRequest, PageResponse};
use cosmos_sdk_proto::cosmos::base::v1beta1 as base;
use cosmos_sdk_proto::cosmos::crypto::ed25519::PubKey as Ed25519PubKey;
use cosmos_sdk_proto::cosmos::distribution::v1beta1::{
    query_client::QueryClient as DistributionClient, QueryValidatorCommissionRequest,
};
use cosmos_sdk_proto::cosmos::slashing::v1beta1::{
    query_client::QueryClient as SlashingClient, QuerySigningInfoRequest, ValidatorSigningInfo,
};
use cosmos_sdk_proto::cosmos::staking::v1beta1::{
    self as staking, query_client::QueryClient as StakingClient, QueryRedelegationsRequest,
    QueryValidatorDelegationsRequest, QueryValidatorRequest,
    QueryValidatorUnbondingDelegationsRequest,
};

use chainscrape_core::amount::Amount;
use chainscrape_core::error::{ExporterError, Result};

use super::{
    ChainQuery, Coin, ConsensusPubKey, DecCoin, Delegation, Redelegation, SigningInfo, Unbonding,
    ValidatorInfo,
};

const ED25519_TYPE_URL: &str = "/cosmos.crypto.ed25519.PubKey";

const PAGE_LIMIT: u64 = 500;
/// Hard stop for paginated listings.
const MAX_PAGES: usize = 100;

pub struct GrpcChain {
    channel: Channel,
}

impl GrpcChain {
    /// Build the channel without dialing; the first query connects.
    pub fn connect_lazy(url: &str, timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(url.to_string())
            .map_err(|e| ExporterError::Config(format!("grpc url {url:?}: {e}")))?
            .timeout(timeout)
            .connect_timeout(timeout)
            .connect_lazy();
        Ok(Self { channel })
    }
}

fn unavailable(what: &str) -> impl FnOnce(tonic::Status) -> ExporterError + '_ {
    move |s| ExporterError::SourceUnavailable(format!("{what}: {:?}: {}", s.code(), s.message()))
}

fn page(key: Vec<u8>) -> Option<PageRequest> {
    Some(PageRequest {
        key,
        limit: PAGE_LIMIT,
        ..Default::default()
    })
}

fn next_key(p: Option<PageResponse>) -> Option<Vec<u8>> {
    p.map(|p| p.next_key).filter(|k| !k.is_empty())
}

/// Request pages until the server stops returning a `next_key`.
/// A listing longer than `MAX_PAGES` is a decode failure.
async fn paginate<T, F, Fut>(what: &str, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<PageRequest>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<PageResponse>)>>,
{
    let mut out = Vec::new();
    let mut key = Vec::new();
    for _ in 0..MAX_PAGES {
        let (items, pagination) = fetch(page(key)).await?;
        out.extend(items);
        match next_key(pagination) {
            Some(k) => key = k,
            None => return Ok(out),
        }
    }
    Err(ExporterError::DecodeFailure(format!(
        "{what}: more than {MAX_PAGES} pages"
    )))
}

fn int(what: &str, s: &str) -> Result<Amount> {
    Amount::parse_decimal(s).map_err(|e| ExporterError::DecodeFailure(format!("{what}: {e}")))
}

fn missing(what: &str, field: &str) -> ExporterError {
    ExporterError::DecodeFailure(format!("{what}: response has no {field}"))
}

fn to_coin(what: &str, c: base::Coin) -> Result<Coin> {
    Ok(Coin {
        amount: int(what, &c.amount)?,
        denom: c.denom,
    })
}

/// `Any` type URL and payload of a validator's consensus key.
fn consensus_pubkey(what: &str, key: Option<(String, Vec<u8>)>) -> Result<ConsensusPubKey> {
    match key {
        None => Ok(ConsensusPubKey::Missing),
        Some((type_url, value)) if type_url == ED25519_TYPE_URL => {
            let pk = Ed25519PubKey::decode(value.as_slice()).map_err(|e| {
                ExporterError::DecodeFailure(format!("{what}: consensus pubkey: {e}"))
            })?;
            Ok(ConsensusPubKey::Ed25519(pk.key))
        }
        Some((type_url, _)) => Ok(ConsensusPubKey::Unsupported(type_url)),
    }
}

fn to_validator(what: &str, v: staking::Validator) -> Result<ValidatorInfo> {
    let consensus_pubkey =
        consensus_pubkey(what, v.consensus_pubkey.map(|any| (any.type_url, any.value)))?;
    let commission_rate = v
        .commission
        .and_then(|c| c.commission_rates)
        .map(|r| r.rate)
        .ok_or_else(|| missing(what, "commission rates"))?;

    Ok(ValidatorInfo {
        tokens: int(what, &v.tokens)?,
        operator_address: v.operator_address,
        moniker: v.description.map(|d| d.moniker).unwrap_or_default(),
        delegator_shares: v.delegator_shares,
        commission_rate,
        consensus_pubkey,
    })
}

fn to_delegation(what: &str, d: staking::DelegationResponse) -> Result<Delegation> {
    let delegation = d.delegation.ok_or_else(|| missing(what, "delegation"))?;
    let balance = d.balance.ok_or_else(|| missing(what, "balance"))?;
    Ok(Delegation {
        delegator_address: delegation.delegator_address,
        validator_address: delegation.validator_address,
        balance: to_coin(what, balance)?,
    })
}

fn to_unbonding(what: &str, u: staking::UnbondingDelegation) -> Result<Unbonding> {
    let entries = u
        .entries
        .iter()
        .map(|e| int(what, &e.balance))
        .collect::<Result<Vec<_>>>()?;
    Ok(Unbonding {
        delegator_address: u.delegator_address,
        validator_address: u.validator_address,
        entries,
    })
}

fn to_redelegation(what: &str, r: staking::RedelegationResponse) -> Result<Redelegation> {
    let red = r.redelegation.ok_or_else(|| missing(what, "redelegation"))?;
    let entries = r
        .entries
        .iter()
        .map(|e| int(what, &e.balance))
        .collect::<Result<Vec<_>>>()?;
    Ok(Redelegation {
        delegator_address: red.delegator_address,
        src_validator_address: red.validator_src_address,
        dst_validator_address: red.validator_dst_address,
        entries,
    })
}

fn to_signing_info(what: &str, info: Option<ValidatorSigningInfo>) -> Result<SigningInfo> {
    let info = info.ok_or_else(|| missing(what, "val_signing_info"))?;
    Ok(SigningInfo {
        missed_blocks: info.missed_blocks_counter,
    })
}

#[async_trait]
impl ChainQuery for GrpcChain {
    async fn all_balances(&self, address: &str) -> Result<Vec<Coin>> {
        const WHAT: &str = "bank AllBalances";
        let client = BankClient::new(self.channel.clone());
        paginate(WHAT, |pagination| {
            let mut client = client.clone();
            let request = QueryAllBalancesRequest {
                address: address.to_string(),
                pagination,
                ..Default::default()
            };
            async move {
                let resp = client
                    .all_balances(request)
                    .await
                    .map_err(unavailable(WHAT))?
                    .into_inner();
                let coins = resp
                    .balances
                    .into_iter()
                    .map(|c| to_coin(WHAT, c))
                    .collect::<Result<Vec<_>>>()?;
                Ok::<_, ExporterError>((coins, resp.pagination))
            }
        })
        .await
    }

    async fn validator(&self, valoper: &str) -> Result<ValidatorInfo> {
        const WHAT: &str = "staking Validator";
        let mut client = StakingClient::new(self.channel.clone());
        let v = client
            .validator(QueryValidatorRequest {
                validator_addr: valoper.to_string(),
            })
            .await
            .map_err(unavailable(WHAT))?
            .into_inner()
            .validator
            .ok_or_else(|| missing(WHAT, "validator"))?;
        to_validator(WHAT, v)
    }

    async fn validator_delegations(&self, valoper: &str) -> Result<Vec<Delegation>> {
        const WHAT: &str = "staking ValidatorDelegations";
        let client = StakingClient::new(self.channel.clone());
        paginate(WHAT, |pagination| {
            let mut client = client.clone();
            let request = QueryValidatorDelegationsRequest {
                validator_addr: valoper.to_string(),
                pagination,
            };
            async move {
                let resp = client
                    .validator_delegations(request)
                    .await
                    .map_err(unavailable(WHAT))?
                    .into_inner();
                let delegations = resp
                    .delegation_responses
                    .into_iter()
                    .map(|d| to_delegation(WHAT, d))
                    .collect::<Result<Vec<_>>>()?;
                Ok::<_, ExporterError>((delegations, resp.pagination))
            }
        })
        .await
    }

    async fn validator_commission(&self, valoper: &str) -> Result<Vec<DecCoin>> {
        const WHAT: &str = "distribution ValidatorCommission";
        let mut client = DistributionClient::new(self.channel.clone());
        let resp = client
            .validator_commission(QueryValidatorCommissionRequest {
                validator_address: valoper.to_string(),
            })
            .await
            .map_err(unavailable(WHAT))?
            .into_inner();
        Ok(resp
            .commission
            .map(|c| c.commission)
            .unwrap_or_default()
            .into_iter()
            .map(|c| DecCoin {
                denom: c.denom,
                amount: c.amount,
            })
            .collect())
    }

    async fn validator_unbondings(&self, valoper: &str) -> Result<Vec<Unbonding>> {
        const WHAT: &str = "staking ValidatorUnbondingDelegations";
        let client = StakingClient::new(self.channel.clone());
        paginate(WHAT, |pagination| {
            let mut client = client.clone();
            let request = QueryValidatorUnbondingDelegationsRequest {
                validator_addr: valoper.to_string(),
                pagination,
            };
            async move {
                let resp = client
                    .validator_unbonding_delegations(request)
                    .await
                    .map_err(unavailable(WHAT))?
                    .into_inner();
                let unbondings = resp
                    .unbonding_responses
                    .into_iter()
                    .map(|u| to_unbonding(WHAT, u))
                    .collect::<Result<Vec<_>>>()?;
                Ok::<_, ExporterError>((unbondings, resp.pagination))
            }
        })
        .await
    }

    async fn validator_redelegations(&self, valoper: &str) -> Result<Vec<Redelegation>> {
        const WHAT: &str = "staking Redelegations";
        let client = StakingClient::new(self.channel.clone());
        paginate(WHAT, |pagination| {
            let mut client = client.clone();
            let request = QueryRedelegationsRequest {
                src_validator_addr: valoper.to_string(),
                pagination,
                ..Default::default()
            };
            async move {
                let resp = client
                    .redelegations(request)
                    .await
                    .map_err(unavailable(WHAT))?
                    .into_inner();
                let redelegations = resp
                    .redelegation_responses
                    .into_iter()
                    .map(|r| to_redelegation(WHAT, r))
                    .collect::<Result<Vec<_>>>()?;
                Ok::<_, ExporterError>((redelegations, resp.pagination))
            }
        })
        .await
    }

    async fn signing_info(&self, valcons: &str) -> Result<SigningInfo> {
        const WHAT: &str = "slashing SigningInfo";
        let mut client = SlashingClient::new(self.channel.clone());
        let resp = client
            .signing_info(QuerySigningInfoRequest {
                cons_address: valcons.to_string(),
            })
            .await
            .map_err(unavailable(WHAT))?
            .into_inner();
        to_signing_info(WHAT, resp.val_signing_info)
    }
}
