//! Address codecs for the request parameters chainscrape accepts.
//!
//! - Cosmos addresses: bech32 with a configured human-readable prefix
//!   (`cudos1…`, `cudosvaloper1…`, `cudosvalcons1…`).
//! - EVM addresses: `0x` followed by 40 hex digits.
//!
//! All parsers are panic-free: malformed input is reported as
//! `ExporterError::InvalidInput` so a bad query parameter rejects one request
//! and nothing else.

pub mod bech32;
pub mod evm;

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{ExporterError, Result};

pub use evm::EvmAddress;

/// Which bech32 prefix family an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Account,
    ValidatorOperator,
    ValidatorConsensus,
}

impl AddressKind {
    /// Human-readable part for this kind under a chain prefix.
    pub fn hrp(self, prefix: &str) -> String {
        match self {
            AddressKind::Account => prefix.to_string(),
            AddressKind::ValidatorOperator => format!("{prefix}valoper"),
            AddressKind::ValidatorConsensus => format!("{prefix}valcons"),
        }
    }
}

/// A validated bech32 Cosmos address. Display yields the canonical
/// lowercase form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmosAddress {
    kind: AddressKind,
    encoded: String,
}

impl CosmosAddress {
    /// Validate `s` as an address of `kind` under chain `prefix`.
    pub fn parse(s: &str, prefix: &str, kind: AddressKind) -> Result<Self> {
        let (hrp, payload) = bech32::decode(s)?;
        let expected = kind.hrp(prefix);
        if hrp != expected {
            return Err(ExporterError::InvalidInput(format!(
                "address {s:?} has prefix {hrp:?}, expected {expected:?}"
            )));
        }
        if payload.len() != 20 && payload.len() != 32 {
            return Err(ExporterError::InvalidInput(format!(
                "address {s:?} has a {}-byte payload, expected 20 or 32",
                payload.len()
            )));
        }
        Ok(Self {
            kind,
            encoded: s.to_ascii_lowercase(),
        })
    }

    /// Consensus address for an ed25519 consensus public key: the first 20
    /// bytes of its SHA-256, bech32-encoded under `<prefix>valcons`.
    pub fn consensus_from_ed25519(prefix: &str, pubkey: &[u8]) -> Result<Self> {
        if pubkey.len() != 32 {
            return Err(ExporterError::DecodeFailure(format!(
                "ed25519 public key must be 32 bytes, got {}",
                pubkey.len()
            )));
        }
        let digest = Sha256::digest(pubkey);
        let hash = digest.get(..20).ok_or_else(|| {
            ExporterError::Internal("sha256 digest shorter than 20 bytes".into())
        })?;
        let kind = AddressKind::ValidatorConsensus;
        let encoded = bech32::encode(&kind.hrp(prefix), hash)?;
        Ok(Self { kind, encoded })
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for CosmosAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}
