//! Raw upstream numbers -> gauge-ready `f64`.
//!
//! Sources report numbers in several encodings:
//! - token base units as arbitrary-precision integers (`Integer`)
//! - human decimal strings for fees, weights and rates (`Decimal`)
//! - Cosmos `Dec` values which gRPC emits as an integer scaled by 10^18
//!   (`FixedPoint`)
//! - plain counters and already-computed floats (`Count`, `Float`)
//!
//! Only `Integer` and `FixedPoint` are subject to the per-deployment
//! denomination coefficient, and only when the gauge asks for it.

use crate::amount::{Accuracy, Amount};
use crate::error::{ExporterError, Result};

/// Scale of a Cosmos SDK `Dec` (18 fractional digits).
pub const DEC_SCALE: f64 = 1e18;

/// One raw numeric payload as decoded by a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum RawNumber {
    Integer(Amount),
    Decimal(String),
    FixedPoint(String),
    Count(i64),
    Float(f64),
}

/// Whether a gauge divides token amounts by the denomination coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    /// `value / coefficient`: base units to display units.
    Denom,
    /// Value is rendered as reported.
    Unscaled,
}

/// A converted value plus the direction of any rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub value: f64,
    pub accuracy: Accuracy,
}

impl Normalized {
    fn exact(value: f64) -> Self {
        Self {
            value,
            accuracy: Accuracy::Exact,
        }
    }
}

/// Stateless converter bound to one denomination coefficient.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    coefficient: f64,
}

impl Normalizer {
    pub fn new(coefficient: f64) -> Result<Self> {
        if !coefficient.is_finite() || coefficient <= 0.0 {
            return Err(ExporterError::Config(format!(
                "denomination coefficient must be a positive finite number, got {coefficient}"
            )));
        }
        Ok(Self { coefficient })
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    pub fn normalize(&self, raw: &RawNumber, scaling: Scaling) -> Result<Normalized> {
        let divisor = match scaling {
            Scaling::Denom => self.coefficient,
            Scaling::Unscaled => 1.0,
        };

        match raw {
            RawNumber::Integer(a) => {
                let (value, accuracy) = a.div_f64(divisor);
                Ok(Normalized { value, accuracy })
            }
            RawNumber::Decimal(s) => parse_decimal(s).map(Normalized::exact),
            RawNumber::FixedPoint(s) => self.fixed_point(s, divisor),
            RawNumber::Count(n) => Ok(Normalized::exact(*n as f64)),
            RawNumber::Float(f) if f.is_finite() => Ok(Normalized::exact(*f)),
            RawNumber::Float(f) => Err(ExporterError::NormalizationFailure(format!(
                "non-finite value {f}"
            ))),
        }
    }

    fn fixed_point(&self, s: &str, divisor: f64) -> Result<Normalized> {
        let s = s.trim();
        // REST gateways render `Dec` with a decimal point; gRPC does not.
        if s.contains('.') {
            let v = parse_decimal(s)?;
            let q = v / divisor;
            let residual = (-q).mul_add(divisor, v);
            return Ok(Normalized {
                value: q,
                accuracy: Accuracy::from_residual(residual),
            });
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let amount = Amount::parse_decimal(digits)
            .map_err(|e| ExporterError::NormalizationFailure(format!("fixed-point {s:?}: {e}")))?;
        let (value, accuracy) = amount.div_f64(DEC_SCALE * divisor);
        if negative {
            let accuracy = match accuracy {
                Accuracy::Below => Accuracy::Above,
                Accuracy::Above => Accuracy::Below,
                Accuracy::Exact => Accuracy::Exact,
            };
            return Ok(Normalized {
                value: -value,
                accuracy,
            });
        }
        Ok(Normalized { value, accuracy })
    }
}

fn parse_decimal(s: &str) -> Result<f64> {
    let v: f64 = s
        .trim()
        .parse()
        .map_err(|e| ExporterError::NormalizationFailure(format!("decimal {s:?}: {e}")))?;
    if !v.is_finite() {
        return Err(ExporterError::NormalizationFailure(format!(
            "decimal {s:?} is not finite"
        )));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn n(c: f64) -> Normalizer {
        Normalizer::new(c).unwrap()
    }

    #[test]
    fn scales_base_units() {
        let raw = RawNumber::Integer(Amount::from_u128(1_000_000_000));
        let v = n(1_000_000.0).normalize(&raw, Scaling::Denom).unwrap();
        assert_eq!(v.value, 1000.0);
        assert_eq!(v.accuracy, Accuracy::Exact);
    }

    #[test]
    fn unscaled_integer_passes_through() {
        let raw = RawNumber::Integer(Amount::from_u128(42));
        assert_eq!(n(1e18).normalize(&raw, Scaling::Unscaled).unwrap().value, 42.0);
    }

    #[test]
    fn decimal_strings_ignore_scaling() {
        let raw = RawNumber::Decimal("0.003000000000000000".into());
        assert_eq!(n(1e6).normalize(&raw, Scaling::Denom).unwrap().value, 0.003);
    }

    #[test]
    fn grpc_dec_is_fixed_point() {
        // 0.05 commission rate as emitted over gRPC
        let raw = RawNumber::FixedPoint("50000000000000000".into());
        let v = n(1e18).normalize(&raw, Scaling::Unscaled).unwrap();
        assert!((v.value - 0.05).abs() < 1e-15);

        let rest = RawNumber::FixedPoint("0.050000000000000000".into());
        assert_eq!(n(1e18).normalize(&rest, Scaling::Unscaled).unwrap().value, 0.05);
    }

    #[test]
    fn garbage_is_a_normalization_failure() {
        let err = n(1.0)
            .normalize(&RawNumber::Decimal("abc".into()), Scaling::Unscaled)
            .unwrap_err();
        assert_eq!(err.client_code().as_str(), "NORMALIZATION_FAILED");
        assert!(n(1.0)
            .normalize(&RawNumber::Decimal("NaN".into()), Scaling::Unscaled)
            .is_err());
    }

    #[test]
    fn rejects_bad_coefficient() {
        assert!(Normalizer::new(0.0).is_err());
        assert!(Normalizer::new(f64::NAN).is_err());
        assert!(Normalizer::new(-1.0).is_err());
    }
}
