//! EVM account / contract addresses.

use std::fmt;

use crate::error::{ExporterError, Result};

/// A 20-byte EVM address, kept in lowercase `0x…` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmAddress {
    bytes: [u8; 20],
}

impl EvmAddress {
    /// Accepts `0x` + 40 hex digits in any case. Checksums are not enforced.
    pub fn parse(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| ExporterError::InvalidInput(format!("evm address {s:?} must start with 0x")))?;
        if digits.len() != 40 {
            return Err(ExporterError::InvalidInput(format!(
                "evm address {s:?} must have 40 hex digits, got {}",
                digits.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| ExporterError::InvalidInput(format!("evm address {s:?}: {e}")))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.bytes
    }

    /// ABI encoding as a static `address` argument: left-padded to 32 bytes.
    pub fn abi_word(&self) -> String {
        format!("{}{}", "0".repeat(24), hex::encode(self.bytes))
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.bytes))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parses_and_normalizes_case() {
        let a = EvmAddress::parse("0x817BBDbC3e8A1204f3691d14bB44992841e3dB35").unwrap();
        assert_eq!(a.to_string(), "0x817bbdbc3e8a1204f3691d14bb44992841e3db35");
        assert_eq!(a.abi_word().len(), 64);
        assert!(a.abi_word().starts_with("000000000000000000000000817bbd"));
    }

    #[test]
    fn rejects_malformed() {
        assert!(EvmAddress::parse("817BBDbC3e8A1204f3691d14bB44992841e3dB35").is_err());
        assert!(EvmAddress::parse("0x1234").is_err());
        assert!(EvmAddress::parse("0xzz7BBDbC3e8A1204f3691d14bB44992841e3dB35").is_err());
        assert!(EvmAddress::parse("").is_err());
    }
}
