//! Arbitrary-precision unsigned token amounts (panic-free).
//!
//! Balances arrive in base units that routinely exceed `u128` (an ERC20
//! `uint256`, a Cosmos `Int`). `Amount` keeps the exact integer and converts
//! to `f64` only once, with round-half-to-even and an accuracy flag.
//!
//! Parsing rules:
//! - Never index limbs directly; use `get`/`first`/`last`.
//! - Inputs are length-capped so the converted value is always finite.

use crate::error::{ExporterError, Result};

/// Longest accepted decimal input (about 850 bits).
const MAX_DECIMAL_DIGITS: usize = 256;
/// Longest accepted hex input (512 bits).
const MAX_HEX_DIGITS: usize = 128;

/// Direction of the rounding applied by a float conversion, relative to the
/// exact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    Below,
    Exact,
    Above,
}

impl Accuracy {
    /// Fold the flag of a later conversion step into this one.
    ///
    /// Exact only when both steps are exact; when the steps disagree the
    /// later step's direction is reported.
    pub fn then(self, later: Accuracy) -> Accuracy {
        match (self, later) {
            (a, Accuracy::Exact) => a,
            (_, b) => b,
        }
    }

    /// Sign of `exact - approx` expressed as an accuracy flag.
    pub(crate) fn from_residual(residual: f64) -> Accuracy {
        if residual > 0.0 {
            Accuracy::Below
        } else if residual < 0.0 {
            Accuracy::Above
        } else {
            Accuracy::Exact
        }
    }
}

/// Unsigned big integer, little-endian `u64` limbs without trailing zeros.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Amount {
    limbs: Vec<u64>,
}

impl Amount {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_u128(v: u128) -> Self {
        let mut limbs = vec![v as u64, (v >> 64) as u64];
        while limbs.last() == Some(&0) {
            limbs.pop();
        }
        Self { limbs }
    }

    /// Parse a base-10 integer string such as a Cosmos `Int` (`"1500000"`).
    pub fn parse_decimal(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(ExporterError::DecodeFailure("empty integer".into()));
        }
        if s.len() > MAX_DECIMAL_DIGITS {
            return Err(ExporterError::DecodeFailure(format!(
                "integer longer than {MAX_DECIMAL_DIGITS} digits"
            )));
        }
        let mut a = Self::zero();
        for c in s.chars() {
            let d = c
                .to_digit(10)
                .ok_or_else(|| ExporterError::DecodeFailure(format!("invalid digit {c:?} in {s:?}")))?;
            a.mul_add_small(10, d as u64);
        }
        Ok(a)
    }

    /// Parse a JSON-RPC quantity (`"0x1bc16d674ec80000"`); the prefix is optional.
    pub fn parse_hex(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() {
            return Err(ExporterError::DecodeFailure("empty hex quantity".into()));
        }
        if digits.len() > MAX_HEX_DIGITS {
            return Err(ExporterError::DecodeFailure(format!(
                "hex quantity longer than {MAX_HEX_DIGITS} digits"
            )));
        }
        let mut a = Self::zero();
        for c in digits.chars() {
            let d = c
                .to_digit(16)
                .ok_or_else(|| ExporterError::DecodeFailure(format!("invalid hex digit {c:?} in {s:?}")))?;
            a.mul_add_small(16, d as u64);
        }
        Ok(a)
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.is_empty()
    }

    /// Number of significant bits.
    pub fn bits(&self) -> u32 {
        match self.limbs.last() {
            None => 0,
            Some(top) => 64 * (self.limbs.len() as u32 - 1) + (64 - top.leading_zeros()),
        }
    }

    /// Exact sum. Never overflows; the result grows a limb instead.
    pub fn add(&self, other: &Amount) -> Amount {
        let len = self.limbs.len().max(other.limbs.len());
        let mut limbs = Vec::with_capacity(len + 1);
        let mut carry = 0u128;
        for i in 0..len {
            let a = self.limbs.get(i).copied().unwrap_or(0) as u128;
            let b = other.limbs.get(i).copied().unwrap_or(0) as u128;
            let v = a + b + carry;
            limbs.push(v as u64);
            carry = v >> 64;
        }
        if carry != 0 {
            limbs.push(carry as u64);
        }
        Amount { limbs }
    }

    /// `self = self * mul + add`.
    fn mul_add_small(&mut self, mul: u64, add: u64) {
        let mut carry = add as u128;
        for limb in self.limbs.iter_mut() {
            let v = (*limb as u128) * (mul as u128) + carry;
            *limb = v as u64;
            carry = v >> 64;
        }
        if carry != 0 {
            self.limbs.push(carry as u64);
        }
    }

    /// The 64 bits starting at bit `shift`, plus whether any bit below
    /// `shift` is set.
    fn window(&self, shift: u32) -> (u64, bool) {
        let idx = (shift / 64) as usize;
        let off = shift % 64;

        let lo = self.limbs.get(idx).copied().unwrap_or(0);
        let hi = self.limbs.get(idx + 1).copied().unwrap_or(0);
        let top = if off == 0 { lo } else { (lo >> off) | (hi << (64 - off)) };

        let below_idx = self.limbs.iter().take(idx).any(|l| *l != 0);
        let below_off = off != 0 && (lo & ((1u64 << off) - 1)) != 0;
        (top, below_idx || below_off)
    }

    /// Correctly rounded conversion to `f64`.
    pub fn to_f64(&self) -> (f64, Accuracy) {
        let bits = self.bits();
        if bits <= 64 {
            let v = self.limbs.first().copied().unwrap_or(0);
            let f = v as f64;
            // f <= 2^64, so the round trip through u128 is exact.
            let back = f as u128;
            let acc = match back.cmp(&(v as u128)) {
                std::cmp::Ordering::Less => Accuracy::Below,
                std::cmp::Ordering::Equal => Accuracy::Exact,
                std::cmp::Ordering::Greater => Accuracy::Above,
            };
            return (f, acc);
        }

        let shift = bits - 64;
        let (top, sticky) = self.window(shift);
        // Bit 0 sits far below the f64 rounding position, so folding the
        // sticky bit into it breaks ties exactly like the full value would.
        let m = top | sticky as u64;
        let fm = m as f64;
        let f = fm * pow2(shift);

        let rounded = fm as u128;
        let acc = match rounded.cmp(&(top as u128)) {
            std::cmp::Ordering::Greater => Accuracy::Above,
            std::cmp::Ordering::Less => Accuracy::Below,
            std::cmp::Ordering::Equal if sticky => Accuracy::Below,
            std::cmp::Ordering::Equal => Accuracy::Exact,
        };
        (f, acc)
    }

    /// `self / divisor` as `f64`: exact integer conversion, then one IEEE
    /// division. The flag covers both steps.
    pub fn div_f64(&self, divisor: f64) -> (f64, Accuracy) {
        let (v, conv) = self.to_f64();
        let q = v / divisor;
        // The residual of a correctly rounded quotient is representable, so
        // the fused multiply-add gives its exact sign.
        let residual = (-q).mul_add(divisor, v);
        (q, conv.then(Accuracy::from_residual(residual)))
    }
}

/// Exact `2^exp` for exponents inside the normal `f64` range.
fn pow2(exp: u32) -> f64 {
    f64::from_bits(((1023 + exp as u64) & 0x7ff) << 52)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn small_values_are_exact() {
        let a = Amount::parse_decimal("1000000000").unwrap();
        assert_eq!(a.to_f64(), (1_000_000_000.0, Accuracy::Exact));
        assert_eq!(Amount::zero().to_f64(), (0.0, Accuracy::Exact));
    }

    #[test]
    fn hex_and_decimal_agree() {
        let h = Amount::parse_hex("0x1bc16d674ec80000").unwrap();
        let d = Amount::parse_decimal("2000000000000000000").unwrap();
        assert_eq!(h, d);
    }

    #[test]
    fn leading_zero_padding_is_ignored() {
        let padded = format!("0x{}{}", "0".repeat(60), "03e8");
        assert_eq!(Amount::parse_hex(&padded).unwrap(), Amount::from_u128(1000));
    }

    #[test]
    fn u256_max_converts_with_rounding_up() {
        let max = format!("0x{}", "f".repeat(64));
        let (f, acc) = Amount::parse_hex(&max).unwrap().to_f64();
        assert_eq!(f, 2f64.powi(256));
        assert_eq!(acc, Accuracy::Above);
    }

    #[test]
    fn wide_value_truncated_bits_round_down() {
        // 2^70 + 1 is not representable; nearest is 2^70.
        let v = (1u128 << 70) + 1;
        let (f, acc) = Amount::from_u128(v).to_f64();
        assert_eq!(f, 2f64.powi(70));
        assert_eq!(acc, Accuracy::Below);
    }

    #[test]
    fn division_reports_inexact_quotient() {
        let (q, acc) = Amount::from_u128(1).div_f64(3.0);
        assert_eq!(q, 1.0 / 3.0);
        assert_ne!(acc, Accuracy::Exact);

        let (q, acc) = Amount::from_u128(1_000_000_000).div_f64(1_000_000.0);
        assert_eq!(q, 1000.0);
        assert_eq!(acc, Accuracy::Exact);
    }

    #[test]
    fn addition_carries_across_limbs() {
        let a = Amount::from_u128(u64::MAX as u128);
        let sum = a.add(&Amount::from_u128(1));
        assert_eq!(sum, Amount::from_u128(1u128 << 64));
        assert_eq!(sum.bits(), 65);

        let entries = ["1500000", "2500000", "0"];
        let total = entries
            .iter()
            .map(|e| Amount::parse_decimal(e).unwrap())
            .fold(Amount::zero(), |acc, e| acc.add(&e));
        assert_eq!(total, Amount::from_u128(4_000_000));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Amount::parse_decimal("").is_err());
        assert!(Amount::parse_decimal("12a").is_err());
        assert!(Amount::parse_decimal("-5").is_err());
        assert!(Amount::parse_hex("0x").is_err());
        assert!(Amount::parse_hex("0xzz").is_err());
        assert!(Amount::parse_decimal(&"9".repeat(300)).is_err());
    }
}
