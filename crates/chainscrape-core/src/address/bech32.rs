//! BIP-173 bech32 encoding (the variant Cosmos SDK addresses use).
//!
//! Parsing rules:
//! - Mixed-case strings are rejected; all-uppercase is accepted.
//! - Total length is capped at 90 characters.
//! - Payload bits are regrouped 5 -> 8 without padding; leftover non-zero
//!   bits are an error.

use crate::error::{ExporterError, Result};

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
const CHECKSUM_LEN: usize = 6;
const MAX_LEN: usize = 90;

fn invalid(s: &str, why: &str) -> ExporterError {
    ExporterError::InvalidInput(format!("invalid bech32 {s:?}: {why}"))
}

fn polymod(values: impl IntoIterator<Item = u8>) -> u32 {
    let mut chk: u32 = 1;
    for v in values {
        let top = chk >> 25;
        chk = ((chk & 0x1ff_ffff) << 5) ^ v as u32;
        for (i, g) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 2 + 1);
    out.extend(bytes.iter().map(|b| b >> 5));
    out.push(0);
    out.extend(bytes.iter().map(|b| b & 31));
    out
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max = (1u32 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &v in data {
        if (v as u32) >> from != 0 {
            return None;
        }
        acc = (acc << from) | v as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max) != 0 {
        return None;
    }
    Some(out)
}

/// Decode into `(hrp, payload bytes)`. The hrp is returned lowercase.
pub fn decode(s: &str) -> Result<(String, Vec<u8>)> {
    if s.len() > MAX_LEN {
        return Err(invalid(s, "too long"));
    }
    let has_lower = s.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = s.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(invalid(s, "mixed case"));
    }
    let lower = s.to_ascii_lowercase();

    let sep = lower.rfind('1').ok_or_else(|| invalid(s, "missing separator"))?;
    let (hrp, rest) = lower.split_at(sep);
    let data_part = rest.get(1..).unwrap_or_default();
    if hrp.is_empty() {
        return Err(invalid(s, "empty prefix"));
    }
    if data_part.len() < CHECKSUM_LEN {
        return Err(invalid(s, "data part too short"));
    }
    if !hrp.bytes().all(|b| (33..=126).contains(&b)) {
        return Err(invalid(s, "prefix has invalid characters"));
    }

    let mut values = Vec::with_capacity(data_part.len());
    for c in data_part.bytes() {
        let v = CHARSET
            .iter()
            .position(|x| *x == c)
            .ok_or_else(|| invalid(s, "invalid data character"))?;
        values.push(v as u8);
    }

    let check = hrp_expand(hrp).into_iter().chain(values.iter().copied());
    if polymod(check) != 1 {
        return Err(invalid(s, "checksum mismatch"));
    }

    let payload_5bit = values
        .get(..values.len() - CHECKSUM_LEN)
        .unwrap_or_default();
    let payload = convert_bits(payload_5bit, 5, 8, false)
        .ok_or_else(|| invalid(s, "invalid payload padding"))?;
    Ok((hrp.to_string(), payload))
}

/// Encode `payload` under `hrp`.
pub fn encode(hrp: &str, payload: &[u8]) -> Result<String> {
    if hrp.is_empty() || !hrp.bytes().all(|b| (33..=126).contains(&b)) {
        return Err(ExporterError::InvalidInput(format!("invalid bech32 prefix {hrp:?}")));
    }
    let hrp = hrp.to_ascii_lowercase();
    let data = convert_bits(payload, 8, 5, true)
        .ok_or_else(|| ExporterError::Internal("bech32 regroup of 8-bit data failed".into()))?;

    let check_input = hrp_expand(&hrp)
        .into_iter()
        .chain(data.iter().copied())
        .chain(std::iter::repeat(0).take(CHECKSUM_LEN));
    let pm = polymod(check_input) ^ 1;

    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + CHECKSUM_LEN);
    out.push_str(&hrp);
    out.push('1');
    let checksum = (0..CHECKSUM_LEN).map(|i| ((pm >> (5 * (5 - i))) & 31) as u8);
    for v in data.iter().copied().chain(checksum) {
        let c = CHARSET.get(v as usize).copied().unwrap_or(b'q');
        out.push(c as char);
    }
    if out.len() > MAX_LEN {
        return Err(ExporterError::InvalidInput(format!(
            "encoded address for prefix {hrp:?} exceeds {MAX_LEN} characters"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn bip173_vectors_decode() {
        for s in [
            "A12UEL5L",
            "a12uel5l",
            "abcdef1qpzry9x8gf2tvdw0s3jn54khce6mua7lmqqqxw",
            "split1checkupstagehandshakeupstreamerranterredcaperred2y9e3w",
        ] {
            decode(s).unwrap();
        }
    }

    #[test]
    fn bip173_invalid_vectors() {
        for s in ["pzry9x0s0muk", "1pzry9x0s0muk", "x1b4n0q5v", "li1dgmt3", "A1G7SGD8", "a12UEL5L"] {
            assert!(decode(s).is_err(), "{s} should be rejected");
        }
    }

    #[test]
    fn encode_decode_preserves_payload() {
        let payload: Vec<u8> = (0u8..20).collect();
        let s = encode("cudos", &payload).unwrap();
        assert!(s.starts_with("cudos1"));
        let (hrp, back) = decode(&s).unwrap();
        assert_eq!(hrp, "cudos");
        assert_eq!(back, payload);
    }
}
