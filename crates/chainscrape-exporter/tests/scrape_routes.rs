#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use tower::ServiceExt;

use chainscrape_core::address::EvmAddress;
use chainscrape_core::amount::Amount;
use chainscrape_core::error::{ExporterError, Result};
use chainscrape_exporter::app_state::AppState;
use chainscrape_exporter::config;
use chainscrape_exporter::router::build_router;
use chainscrape_exporter::sources::{
    ChainQuery, Coin, ConsensusPubKey, ConsensusQuery, DecCoin, Delegation, EvmQuery, Liquidity,
    NodeStatus, Pool, PoolAsset, PoolQuery, PrecommitTally, Redelegation, SigningInfo, Unbonding,
    Upstreams, ValidatorInfo,
};

const ACCOUNT_A: &str = "cudos1qyqszqgpqyqszqgpqyqszqgpqyqszqgpnzgpnf";
const ACCOUNT_B: &str = "cudos1qgpqyqszqgpqyqszqgpqyqszqgpqyqszzxwycl";
const ETH_A: &str = "0x817bbdbc3e8a1204f3691d14bb44992841e3db35";
const ETH_B: &str = "0xa4108aa1ec4967f8b52220a4f7e94a8201f2d906";
const VALOPER: &str = "cudosvaloper1qurswpc8qurswpc8qurswpc8qurswpc803qylf";
const VALCONS: &str = "cudosvalcons1vvxu62txcsekdygj23ythvjmfl6p9fyuaq87t3";

const CONFIG: &str = r#"
version: 1
chain:
  bech32_prefix: "cudos"
  denom: "acudos"
  denom_coefficient: 1000000
gravity:
  token_contract: "0x817bbDbC3e8A1204f3691d14bB44992841e3dB35"
  bridge_contract: "0xa4108aA1Ec4967F8b52220a4f7e94A8201F2D906"
timeouts:
  upstream_timeout_ms: 200
  request_deadline_ms: 1000
const_labels:
  network: "testnet"
"#;

// ---------------------------------------------------------------------------
// fakes

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ok,
    Fail,
    Hang,
}

#[derive(Default)]
struct Behaviour {
    modes: HashMap<&'static str, Mode>,
    calls: AtomicUsize,
}

impl Behaviour {
    async fn gate(&self, method: &'static str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.modes.get(method).copied().unwrap_or(Mode::Ok) {
            Mode::Ok => Ok(()),
            Mode::Fail => Err(ExporterError::SourceUnavailable(format!("{method}: injected"))),
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }
    }
}

struct FakeChain {
    b: Behaviour,
    pubkey: ConsensusPubKey,
}

#[async_trait]
impl ChainQuery for FakeChain {
    async fn all_balances(&self, address: &str) -> Result<Vec<Coin>> {
        self.b.gate("all_balances").await?;
        // answer slowly so concurrent scrapes overlap
        tokio::time::sleep(Duration::from_millis(20)).await;
        let amount = if address == ACCOUNT_A { 5_000_000 } else { 9_000_000 };
        Ok(vec![
            Coin {
                denom: "acudos".into(),
                amount: Amount::from_u128(amount),
            },
            Coin {
                denom: "ibc/27394FB0".into(),
                amount: Amount::zero(),
            },
        ])
    }

    async fn validator(&self, valoper: &str) -> Result<ValidatorInfo> {
        // not counted: the prerequisite is not part of the fan-out
        match self.b.modes.get("validator").copied() {
            Some(Mode::Fail) => Err(ExporterError::SourceUnavailable("validator: injected".into())),
            Some(Mode::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(ExporterError::SourceUnavailable("validator: hung".into()))
            }
            _ => Ok(ValidatorInfo {
                operator_address: valoper.to_string(),
                moniker: "node-a".into(),
                tokens: Amount::from_u128(1_000_000_000_000),
                delegator_shares: "1000000000000000000000000000000".into(),
                commission_rate: "50000000000000000".into(),
                consensus_pubkey: self.pubkey.clone(),
            }),
        }
    }

    async fn validator_delegations(&self, valoper: &str) -> Result<Vec<Delegation>> {
        self.b.gate("validator_delegations").await?;
        Ok(vec![Delegation {
            delegator_address: ACCOUNT_A.into(),
            validator_address: valoper.into(),
            balance: Coin {
                denom: "acudos".into(),
                amount: Amount::from_u128(2_000_000),
            },
        }])
    }

    async fn validator_commission(&self, _valoper: &str) -> Result<Vec<DecCoin>> {
        self.b.gate("validator_commission").await?;
        Ok(vec![DecCoin {
            denom: "acudos".into(),
            amount: "1500000000000000000000000".into(),
        }])
    }

    async fn validator_unbondings(&self, valoper: &str) -> Result<Vec<Unbonding>> {
        self.b.gate("validator_unbondings").await?;
        Ok(vec![Unbonding {
            delegator_address: ACCOUNT_B.into(),
            validator_address: valoper.into(),
            entries: vec![Amount::from_u128(1_000_000), Amount::from_u128(500_000)],
        }])
    }

    async fn validator_redelegations(&self, valoper: &str) -> Result<Vec<Redelegation>> {
        self.b.gate("validator_redelegations").await?;
        Ok(vec![Redelegation {
            delegator_address: ACCOUNT_A.into(),
            src_validator_address: valoper.into(),
            dst_validator_address: "cudosvaloper1other".into(),
            entries: vec![Amount::from_u128(3_000_000)],
        }])
    }

    async fn signing_info(&self, valcons: &str) -> Result<SigningInfo> {
        self.b.gate("signing_info").await?;
        if valcons != VALCONS {
            return Err(ExporterError::SourceUnavailable(format!("unknown {valcons}")));
        }
        Ok(SigningInfo { missed_blocks: 7 })
    }
}

#[derive(Default)]
struct FakeEvm {
    b: Behaviour,
}

#[async_trait]
impl EvmQuery for FakeEvm {
    async fn balance_at(&self, address: &EvmAddress) -> Result<Amount> {
        self.b.gate("balance_at").await?;
        let wei = if address.to_string() == ETH_A { 2_500_000 } else { 7_000_000 };
        Ok(Amount::from_u128(wei))
    }

    async fn erc20_balance_of(&self, _token: &EvmAddress, _holder: &EvmAddress) -> Result<Amount> {
        self.b.gate("erc20_balance_of").await?;
        Ok(Amount::from_u128(42_000_000))
    }
}

#[derive(Default)]
struct FakePools {
    b: Behaviour,
}

#[async_trait]
impl PoolQuery for FakePools {
    async fn pool(&self, _id: u64) -> Result<Pool> {
        self.b.gate("pool").await?;
        Ok(Pool {
            swap_fee: "0.002000000000000000".into(),
            exit_fee: "0.000000000000000000".into(),
            total_weight: "100".into(),
            assets: vec![
                PoolAsset {
                    denom: "uosmo".into(),
                    amount: "1000".into(),
                    weight: "60".into(),
                },
                PoolAsset {
                    denom: "uatom".into(),
                    amount: "2000".into(),
                    weight: "40".into(),
                },
            ],
        })
    }

    async fn total_liquidity(&self) -> Result<Vec<Liquidity>> {
        self.b.gate("total_liquidity").await?;
        Ok(["uosmo", "uatom", "ujuno"]
            .iter()
            .zip([5000, 6000, 7000])
            .map(|(d, a)| Liquidity {
                denom: d.to_string(),
                amount: a.to_string(),
            })
            .collect())
    }
}

#[derive(Default)]
struct FakeConsensus {
    b: Behaviour,
}

#[async_trait]
impl ConsensusQuery for FakeConsensus {
    async fn status(&self) -> Result<NodeStatus> {
        self.b.gate("status").await?;
        Ok(NodeStatus {
            latest_block_time: Utc::now() - chrono::Duration::seconds(3),
        })
    }

    async fn consensus_state(&self) -> Result<PrecommitTally> {
        self.b.gate("consensus_state").await?;
        Ok(PrecommitTally { total: 4, signed: 2 })
    }
}

struct Harness {
    chain: Arc<FakeChain>,
    evm: Arc<FakeEvm>,
    state: AppState,
    app: Router,
}

fn modes(list: &[(&'static str, Mode)]) -> Behaviour {
    Behaviour {
        modes: list.iter().copied().collect(),
        calls: AtomicUsize::new(0),
    }
}

fn harness_with(chain: FakeChain, evm: FakeEvm, pools: FakePools, consensus: FakeConsensus) -> Harness {
    let cfg = config::load_from_str(CONFIG).unwrap();
    let chain = Arc::new(chain);
    let evm = Arc::new(evm);
    let upstreams = Upstreams {
        chain: chain.clone(),
        evm: evm.clone(),
        pools: Arc::new(pools),
        consensus: Arc::new(consensus),
    };
    let state = AppState::with_upstreams(cfg, upstreams).unwrap();
    let app = build_router(state.clone());
    Harness {
        chain,
        evm,
        state,
        app,
    }
}

fn ed25519_key() -> ConsensusPubKey {
    ConsensusPubKey::Ed25519((0u8..32).collect())
}

fn harness() -> Harness {
    harness_with(
        FakeChain {
            b: Behaviour::default(),
            pubkey: ed25519_key(),
        },
        FakeEvm::default(),
        FakePools::default(),
        FakeConsensus::default(),
    )
}

// ---------------------------------------------------------------------------
// helpers

async fn get(app: &Router, uri: &str) -> (StatusCode, String, String) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

/// Every sample of `name` in an exposition document, as (labels, value).
fn samples(body: &str, name: &str) -> Vec<(BTreeMap<String, String>, f64)> {
    body.lines()
        .filter(|l| !l.starts_with('#'))
        .filter_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            let (metric, labels) = match series.split_once('{') {
                Some((m, rest)) => (m, rest.trim_end_matches('}')),
                None => (series, ""),
            };
            if metric != name {
                return None;
            }
            let labels = labels
                .split("\",")
                .filter(|kv| !kv.is_empty())
                .filter_map(|kv| {
                    let (k, v) = kv.split_once("=\"")?;
                    Some((k.to_string(), v.trim_end_matches('"').to_string()))
                })
                .collect();
            Some((labels, value.parse().ok()?))
        })
        .collect()
}

fn value(body: &str, name: &str, want: &[(&str, &str)]) -> Option<f64> {
    samples(body, name)
        .into_iter()
        .find(|(labels, _)| want.iter().all(|(k, v)| labels.get(*k).map(String::as_str) == Some(*v)))
        .map(|(_, v)| v)
}

fn wallet_uri(cosmos: &str, eth: &str) -> String {
    format!(
        "/metrics/gravity-bridge/wallet?cudos_orchestrator_address={cosmos}&ethereum_orchestrator_address={eth}"
    )
}

// ---------------------------------------------------------------------------
// wallet / contract

#[tokio::test]
async fn wallet_renders_both_balances() {
    let h = harness();
    let (status, ct, body) = get(&h.app, &wallet_uri(ACCOUNT_A, ETH_A)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ct.starts_with("text/plain"), "{ct}");

    let pair = [
        ("cudos_orchestrator_address", ACCOUNT_A),
        ("ethereum_orchestrator_address", ETH_A),
        ("network", "testnet"),
    ];
    let mut acudos = pair.to_vec();
    acudos.push(("denom", "acudos"));
    assert_eq!(value(&body, "gravity_cudos_orchestrator_balance", &acudos), Some(5.0));

    // a zero balance is rendered as 0, not dropped
    let mut ibc = pair.to_vec();
    ibc.push(("denom", "ibc/27394FB0"));
    assert_eq!(value(&body, "gravity_cudos_orchestrator_balance", &ibc), Some(0.0));

    assert_eq!(value(&body, "gravity_ethereum_orchestrator_balance", &pair), Some(2.5));
}

#[tokio::test]
async fn wallet_failure_leaves_only_that_gauge_absent() {
    let h = harness_with(
        FakeChain {
            b: Behaviour::default(),
            pubkey: ed25519_key(),
        },
        FakeEvm {
            b: modes(&[("balance_at", Mode::Fail)]),
        },
        FakePools::default(),
        FakeConsensus::default(),
    );
    let (status, _, body) = get(&h.app, &wallet_uri(ACCOUNT_A, ETH_A)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(samples(&body, "gravity_cudos_orchestrator_balance").len(), 2);
    assert!(!body.contains("gravity_ethereum_orchestrator_balance"));

    let metrics = h.state.metrics();
    assert_eq!(
        metrics.source_failure_count("gravity_bridge_wallet", "eth_get_balance", "source_unavailable"),
        1
    );
    assert_eq!(
        metrics.scrape_count("gravity_bridge_wallet", "partial"),
        1
    );
}

#[tokio::test]
async fn wallet_with_everything_failing_is_still_200() {
    let h = harness_with(
        FakeChain {
            b: modes(&[("all_balances", Mode::Fail)]),
            pubkey: ed25519_key(),
        },
        FakeEvm {
            b: modes(&[("balance_at", Mode::Fail)]),
        },
        FakePools::default(),
        FakeConsensus::default(),
    );
    let (status, _, body) = get(&h.app, &wallet_uri(ACCOUNT_A, ETH_A)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("gravity_"));
}

#[tokio::test]
async fn invalid_wallet_input_is_rejected_before_any_query() {
    let h = harness();
    for uri in [
        wallet_uri("cudos1notbech32", ETH_A),
        wallet_uri(VALOPER, ETH_A),
        wallet_uri(ACCOUNT_A, "0x1234"),
        "/metrics/gravity-bridge/wallet?cudos_orchestrator_address=".to_string(),
        "/metrics/gravity-bridge/wallet".to_string(),
    ] {
        let (status, ct, body) = get(&h.app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(ct.starts_with("application/json"));
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "INVALID_INPUT");
        assert!(json["message"].as_str().unwrap().contains("invalid input"));
    }
    assert_eq!(h.chain.b.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.evm.b.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_scrapes_keep_their_own_labels() {
    let h = harness();
    let uri_a = wallet_uri(ACCOUNT_A, ETH_A);
    let uri_b = wallet_uri(ACCOUNT_B, ETH_B);
    let (a, b) = tokio::join!(get(&h.app, &uri_a), get(&h.app, &uri_b));

    assert!(a.2.contains(ACCOUNT_A) && !a.2.contains(ACCOUNT_B));
    assert!(b.2.contains(ACCOUNT_B) && !b.2.contains(ACCOUNT_A));
    assert!(!a.2.contains(ETH_B));
    assert!(!b.2.contains(ETH_A));
    assert_eq!(
        value(&b.2, "gravity_cudos_orchestrator_balance", &[("denom", "acudos")]),
        Some(9.0)
    );
}

#[tokio::test]
async fn hung_upstream_is_cut_off_by_timeout() {
    let h = harness_with(
        FakeChain {
            b: Behaviour::default(),
            pubkey: ed25519_key(),
        },
        FakeEvm {
            b: modes(&[("balance_at", Mode::Hang)]),
        },
        FakePools::default(),
        FakeConsensus::default(),
    );
    let started = Instant::now();
    let (status, _, body) = get(&h.app, &wallet_uri(ACCOUNT_A, ETH_A)).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("gravity_cudos_orchestrator_balance"));
    assert!(!body.contains("gravity_ethereum_orchestrator_balance"));
    assert_eq!(
        h.state
            .metrics()
            .source_failure_count("gravity_bridge_wallet", "eth_get_balance", "timed_out"),
        1
    );
}

#[tokio::test]
async fn contract_balance_uses_configured_addresses() {
    let h = harness();
    let (status, _, body) = get(&h.app, "/metrics/gravity-bridge/contract").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        value(&body, "gravity_ethereum_contract_balance", &[("network", "testnet")]),
        Some(42.0)
    );
}

// ---------------------------------------------------------------------------
// osmosis

#[tokio::test]
async fn osmosis_pool_gauges_carry_pool_id() {
    let h = harness();
    let (status, _, body) = get(&h.app, "/metrics/osmosis?pool_id=1").await;
    assert_eq!(status, StatusCode::OK);

    let pool = [("pool_id", "1")];
    assert_eq!(value(&body, "osmosis_swap_fee", &pool), Some(0.002));
    assert_eq!(value(&body, "osmosis_exit_fee", &pool), Some(0.0));
    assert_eq!(value(&body, "osmosis_pool_weight", &pool), Some(100.0));
    assert_eq!(
        value(&body, "osmosis_pool_asset_weight", &[("pool_id", "1"), ("denom", "uosmo")]),
        Some(60.0)
    );
    assert_eq!(
        value(&body, "osmosis_pool_asset_amount", &[("pool_id", "1"), ("denom", "uatom")]),
        Some(2000.0)
    );
    assert_eq!(samples(&body, "osmosis_total_pool_shares").len(), 3);
}

#[tokio::test]
async fn osmosis_price_denoms_filter_per_denom_gauges() {
    let h = harness();
    let (_, _, body) = get(&h.app, "/metrics/osmosis?pool_id=1&price_denoms=uosmo,ujuno").await;
    let shares: Vec<String> = samples(&body, "osmosis_total_pool_shares")
        .into_iter()
        .map(|(l, _)| l["denom"].clone())
        .collect();
    assert_eq!(shares.len(), 2);
    assert!(shares.contains(&"uosmo".to_string()));
    assert!(shares.contains(&"ujuno".to_string()));
    assert_eq!(samples(&body, "osmosis_pool_asset_amount").len(), 1);
    // pool-level gauges are not per-denom and stay
    assert!(value(&body, "osmosis_swap_fee", &[]).is_some());
}

#[tokio::test]
async fn osmosis_requires_numeric_pool_id() {
    let h = harness();
    for uri in ["/metrics/osmosis", "/metrics/osmosis?pool_id=abc", "/metrics/osmosis?pool_id=-3"] {
        let (status, _, body) = get(&h.app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body.contains("INVALID_INPUT"));
    }
}

#[tokio::test]
async fn duplicated_query_keys_are_invalid_input() {
    let h = harness();
    let cases = [
        ("validator", format!("/metrics/validator?address={VALOPER}&address={VALOPER}")),
        ("osmosis", "/metrics/osmosis?pool_id=1&pool_id=2".to_string()),
        (
            "gravity_bridge_wallet",
            format!("{}&cudos_orchestrator_address={ACCOUNT_B}", wallet_uri(ACCOUNT_A, ETH_A)),
        ),
    ];
    for (route, uri) in &cases {
        let (status, ct, body) = get(&h.app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(ct.starts_with("application/json"), "{uri}: {ct}");
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "INVALID_INPUT");
        assert_eq!(h.state.metrics().scrape_count(route, "rejected_invalid_input"), 1, "{route}");
    }
    assert_eq!(h.chain.b.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.evm.b.calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// status

#[tokio::test]
async fn status_reports_block_age_and_missing_validators() {
    let h = harness();
    let (status, _, body) = get(&h.app, "/metrics/status").await;
    assert_eq!(status, StatusCode::OK);
    let age = value(&body, "block_age", &[]).unwrap();
    assert!((2.0..60.0).contains(&age), "{age}");
    assert_eq!(value(&body, "missing_validators", &[("network", "testnet")]), Some(2.0));
}

#[tokio::test]
async fn status_consensus_failure_keeps_block_age() {
    let h = harness_with(
        FakeChain {
            b: Behaviour::default(),
            pubkey: ed25519_key(),
        },
        FakeEvm::default(),
        FakePools::default(),
        FakeConsensus {
            b: modes(&[("consensus_state", Mode::Fail)]),
        },
    );
    let (status, _, body) = get(&h.app, "/metrics/status").await;
    assert_eq!(status, StatusCode::OK);
    assert!(value(&body, "block_age", &[]).is_some());
    assert!(!body.contains("missing_validators"));
}

// ---------------------------------------------------------------------------
// validator

fn validator_uri() -> String {
    format!("/metrics/validator?address={VALOPER}")
}

#[tokio::test]
async fn validator_renders_every_gauge() {
    let h = harness();
    let (status, _, body) = get(&h.app, &validator_uri()).await;
    assert_eq!(status, StatusCode::OK);

    let who = [("address", VALOPER), ("moniker", "node-a")];
    assert_eq!(value(&body, "cosmos_validator_tokens", &who), Some(1_000_000.0));
    assert_eq!(value(&body, "cosmos_validator_delegators_shares", &who), Some(1_000_000.0));
    assert_eq!(value(&body, "cosmos_validator_commission_rate", &who), Some(0.05));
    assert_eq!(
        value(&body, "cosmos_validator_delegations", &[("delegated_by", ACCOUNT_A), ("denom", "acudos")]),
        Some(2.0)
    );
    assert_eq!(value(&body, "cosmos_validator_commission", &[("denom", "acudos")]), Some(1.5));
    assert_eq!(
        value(&body, "cosmos_validator_unbondings", &[("unbonded_by", ACCOUNT_B), ("denom", "acudos")]),
        Some(1.5)
    );
    assert_eq!(
        value(
            &body,
            "cosmos_validator_redelegations",
            &[("redelegated_by", ACCOUNT_A), ("redelegated_to", "cudosvaloper1other")]
        ),
        Some(3.0)
    );
    assert_eq!(value(&body, "cosmos_validator_missed_blocks", &who), Some(7.0));
    assert_eq!(h.chain.b.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn validator_signing_info_failure_keeps_other_gauges() {
    let h = harness_with(
        FakeChain {
            b: modes(&[("signing_info", Mode::Fail)]),
            pubkey: ed25519_key(),
        },
        FakeEvm::default(),
        FakePools::default(),
        FakeConsensus::default(),
    );
    let (status, _, body) = get(&h.app, &validator_uri()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("cosmos_validator_missed_blocks"));
    for name in [
        "cosmos_validator_tokens",
        "cosmos_validator_delegators_shares",
        "cosmos_validator_commission_rate",
        "cosmos_validator_delegations",
        "cosmos_validator_commission",
        "cosmos_validator_unbondings",
        "cosmos_validator_redelegations",
    ] {
        assert_eq!(samples(&body, name).len(), 1, "{name}");
    }
}

#[tokio::test]
async fn validator_lookup_failure_aborts_with_502() {
    let h = harness_with(
        FakeChain {
            b: modes(&[("validator", Mode::Fail)]),
            pubkey: ed25519_key(),
        },
        FakeEvm::default(),
        FakePools::default(),
        FakeConsensus::default(),
    );
    let (status, _, body) = get(&h.app, &validator_uri()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "PREREQUISITE_FAILED");
    assert_eq!(h.chain.b.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.state
            .metrics()
            .scrape_count("validator", "rejected_prerequisite"),
        1
    );
}

#[tokio::test]
async fn validator_lookup_timeout_aborts_with_502() {
    let h = harness_with(
        FakeChain {
            b: modes(&[("validator", Mode::Hang)]),
            pubkey: ed25519_key(),
        },
        FakeEvm::default(),
        FakePools::default(),
        FakeConsensus::default(),
    );
    let started = Instant::now();
    let (status, _, body) = get(&h.app, &validator_uri()).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "PREREQUISITE_FAILED");
    assert!(json["message"].as_str().unwrap().contains("no response within"));
    assert_eq!(h.chain.b.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.state
            .metrics()
            .scrape_count("validator", "rejected_prerequisite"),
        1
    );
}

#[tokio::test]
async fn unusable_consensus_key_aborts_before_fan_out() {
    for key in [
        ConsensusPubKey::Unsupported("/cosmos.crypto.secp256k1.PubKey".into()),
        ConsensusPubKey::Missing,
    ] {
        let h = harness_with(
            FakeChain {
                b: Behaviour::default(),
                pubkey: key,
            },
            FakeEvm::default(),
            FakePools::default(),
            FakeConsensus::default(),
        );
        let (status, _, body) = get(&h.app, &validator_uri()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("PREREQUISITE_FAILED"));
        assert_eq!(h.chain.b.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn validator_address_must_be_an_operator_address() {
    let h = harness();
    let (status, _, _) = get(&h.app, &format!("/metrics/validator?address={ACCOUNT_A}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// ops

#[tokio::test]
async fn ops_endpoints() {
    let h = harness();
    let (status, _, body) = get(&h.app, "/healthz").await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));

    let (status, _, _) = get(&h.app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    get(&h.app, "/metrics/status").await;
    let (status, ct, body) = get(&h.app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(ct.starts_with("text/plain"));
    assert!(body.contains("chainscrape_scrapes_total{outcome=\"ok\",route=\"status\"} 1"));
    assert!(body.contains("chainscrape_scrape_duration_seconds_count{route=\"status\"} 1"));
    assert!(body.contains("chainscrape_scrapes_inflight{route=\"status\"} 0"));
    assert!(body.contains("chainscrape_draining 0"));

    h.state.set_draining();
    let (status, _, body) = get(&h.app, "/readyz").await;
    assert_eq!((status, body.as_str()), (StatusCode::SERVICE_UNAVAILABLE, "draining"));
}

#[test]
fn const_label_clashing_with_gauge_label_is_refused() {
    let yaml = CONFIG.replace("network: \"testnet\"", "denom: \"acudos\"");
    let cfg = config::load_from_str(&yaml).unwrap();
    let upstreams = Upstreams {
        chain: Arc::new(FakeChain {
            b: Behaviour::default(),
            pubkey: ed25519_key(),
        }),
        evm: Arc::new(FakeEvm::default()),
        pools: Arc::new(FakePools::default()),
        consensus: Arc::new(FakeConsensus::default()),
    };
    let err = AppState::with_upstreams(cfg, upstreams).err().expect("must fail");
    assert_eq!(err.client_code().as_str(), "INVALID_CONFIG");
}
