//! CometBFT (Tendermint) RPC adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use chainscrape_core::error::{ExporterError, Result};

use super::{http, ConsensusQuery, NodeStatus, PrecommitTally};

/// `BA{<size>:<bits>}` summary, e.g. `BA{4:xx_x} 30/40 = 0.75`.
static BIT_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\d+):([x_]*)\}").expect("invalid bit array regex"));

const NIL_VOTE: &str = "nil-Vote";

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(Deserialize)]
struct SyncInfo {
    latest_block_time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ConsensusResult {
    round_state: RoundState,
}

#[derive(Deserialize)]
struct RoundState {
    #[serde(default)]
    height_vote_set: Vec<VoteSet>,
}

#[derive(Deserialize)]
struct VoteSet {
    #[serde(default)]
    precommits: Vec<String>,
    #[serde(default)]
    precommits_bit_array: String,
}

pub struct TendermintRpc {
    client: reqwest::Client,
    base: String,
}

impl TendermintRpc {
    pub fn new(client: reqwest::Client, base: &str) -> Self {
        Self {
            client,
            base: base.to_string(),
        }
    }
}

#[async_trait]
impl ConsensusQuery for TendermintRpc {
    async fn status(&self) -> Result<NodeStatus> {
        let url = http::join(&self.base, "/status");
        let env: Envelope<StatusResult> = http::get_json(&self.client, &url).await?;
        Ok(NodeStatus {
            latest_block_time: env.result.sync_info.latest_block_time,
        })
    }

    async fn consensus_state(&self) -> Result<PrecommitTally> {
        let url = http::join(&self.base, "/consensus_state");
        let env: Envelope<ConsensusResult> = http::get_json(&self.client, &url).await?;
        let round = env
            .result
            .round_state
            .height_vote_set
            .first()
            .ok_or_else(|| ExporterError::DecodeFailure("height_vote_set is empty".into()))?;
        tally(round)
    }
}

/// Count precommits from the per-validator vote list, falling back to the
/// bit-array summary when the node omits the list.
fn tally(round: &VoteSet) -> Result<PrecommitTally> {
    if !round.precommits.is_empty() {
        let total = round.precommits.len() as u64;
        let missing = round.precommits.iter().filter(|v| *v == NIL_VOTE).count() as u64;
        return Ok(PrecommitTally {
            total,
            signed: total - missing,
        });
    }
    parse_bit_array(&round.precommits_bit_array)
}

fn parse_bit_array(summary: &str) -> Result<PrecommitTally> {
    let caps = BIT_ARRAY.captures(summary).ok_or_else(|| {
        ExporterError::DecodeFailure(format!("unrecognized precommits_bit_array {summary:?}"))
    })?;
    let total: u64 = caps
        .get(1)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .parse()
        .map_err(|e| ExporterError::DecodeFailure(format!("bit array size: {e}")))?;
    let signed = caps
        .get(2)
        .map(|m| m.as_str().bytes().filter(|b| *b == b'x').count() as u64)
        .unwrap_or(0);
    if signed > total {
        return Err(ExporterError::DecodeFailure(format!(
            "bit array reports {signed} votes out of {total}"
        )));
    }
    Ok(PrecommitTally { total, signed })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn round(precommits: &[&str], bits: &str) -> VoteSet {
        VoteSet {
            precommits: precommits.iter().map(|s| s.to_string()).collect(),
            precommits_bit_array: bits.to_string(),
        }
    }

    #[test]
    fn vote_list_counts_nil_votes_as_missing() {
        let r = round(
            &[
                "Vote{0:0A1B 100/00/SIGNED_MSG_TYPE_PRECOMMIT(Precommit) 8F3C @ 2024-01-01T00:00:00Z}",
                "nil-Vote",
                "Vote{2:77AA 100/00/SIGNED_MSG_TYPE_PRECOMMIT(Precommit) 8F3C @ 2024-01-01T00:00:00Z}",
                "nil-Vote",
            ],
            "BA{4:x_x_} 20/40 = 0.50",
        );
        let t = tally(&r).unwrap();
        assert_eq!(t, PrecommitTally { total: 4, signed: 2 });
        assert_eq!(t.missing(), 2);
    }

    #[test]
    fn falls_back_to_bit_array() {
        let t = tally(&round(&[], "BA{5:xx_x_} 30/50 = 0.60")).unwrap();
        assert_eq!(t.total, 5);
        assert_eq!(t.missing(), 2);
    }

    #[test]
    fn empty_bit_array_means_everyone_is_missing() {
        let t = parse_bit_array("BA{3:___} 0/30 = 0.00").unwrap();
        assert_eq!(t.missing(), 3);
    }

    #[test]
    fn garbage_summary_is_a_decode_failure() {
        let err = tally(&round(&[], "")).unwrap_err();
        assert_eq!(err.client_code().as_str(), "DECODE_FAILED");
    }
}
