//! Decimal arithmetic utilities for token amounts and weights.

use crate::error::{RebalanceError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Largest number of fractional digits a `Decimal` can carry.
pub const MAX_DECIMALS: u32 = 28;

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// `10^exponent`, or `None` past what a `Decimal` can hold.
pub fn pow10(exponent: u32) -> Option<Decimal> {
    (0..exponent).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(Decimal::TEN))
}

/// Convert a human-readable amount to an integer base-unit string.
///
/// Truncates toward zero: `floor(amount * 10^decimals)`. The scaled value
/// must fit a 96-bit `Decimal` (about 7.9e28 base units); larger results
/// return `Conversion`.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<String> {
    if amount < Decimal::ZERO {
        return Err(RebalanceError::Conversion(format!(
            "negative amount {}",
            amount
        )));
    }

    let scale = pow10(decimals).ok_or_else(|| {
        RebalanceError::Conversion(format!("unsupported precision {}", decimals))
    })?;

    let scaled = amount
        .checked_mul(scale)
        .ok_or_else(|| RebalanceError::Conversion(format!("{} overflows at {} decimals", amount, decimals)))?
        .floor();

    scaled
        .to_u128()
        .map(|units| units.to_string())
        .ok_or_else(|| RebalanceError::Conversion(format!("cannot represent {}", scaled)))
}

/// Convert an integer base-unit string back to a human-readable amount.
///
/// Accepts at most `Decimal::MAX` (about 7.9e28) base units. Larger inputs,
/// even though valid on-chain, return `Conversion`.
pub fn from_base_units(units: &str, decimals: u32) -> Result<Decimal> {
    let raw: u128 = units
        .trim()
        .parse()
        .map_err(|_| RebalanceError::Conversion(format!("invalid base units '{}'", units)))?;

    let raw = i128::try_from(raw)
        .map_err(|_| RebalanceError::Conversion(format!("base units '{}' too large", units)))?;

    Decimal::try_from_i128_with_scale(raw, decimals)
        .map(|amount| amount.normalize())
        .map_err(|e| RebalanceError::Conversion(format!("base units '{}': {}", units, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(1), dec!(4)), dec!(0.25));
        assert_eq!(safe_div(dec!(1), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_pow10() {
        assert_eq!(pow10(0), Some(Decimal::ONE));
        assert_eq!(pow10(6), Some(dec!(1000000)));
        assert!(pow10(18).is_some());
        assert!(pow10(29).is_none());
    }

    #[test]
    fn test_to_base_units_truncates() {
        assert_eq!(to_base_units(dec!(1.5), 6).unwrap(), "1500000");
        assert_eq!(to_base_units(dec!(0.1234567), 6).unwrap(), "123456");
        assert_eq!(to_base_units(dec!(0.5), 18).unwrap(), "500000000000000000");
        assert_eq!(to_base_units(dec!(0.000000009), 8).unwrap(), "0");
    }

    #[test]
    fn test_to_base_units_rejects_negative() {
        assert!(matches!(
            to_base_units(dec!(-1), 6),
            Err(RebalanceError::Conversion(_))
        ));
    }

    #[test]
    fn test_from_base_units() {
        assert_eq!(from_base_units("1500000", 6).unwrap(), dec!(1.5));
        assert_eq!(from_base_units("100000000", 8).unwrap(), dec!(1));
        assert!(from_base_units("12.5", 6).is_err());
        assert!(from_base_units("-5", 6).is_err());
    }

    #[test]
    fn test_amounts_past_decimal_range_rejected() {
        // 2^96 - 1 is the largest mantissa
        assert!(from_base_units("79228162514264337593543950335", 0).is_ok());
        assert!(matches!(
            from_base_units("79228162514264337593543950336", 0),
            Err(RebalanceError::Conversion(_))
        ));
        assert!(matches!(
            from_base_units("100000000000000000000000000000000", 18),
            Err(RebalanceError::Conversion(_))
        ));
        assert!(matches!(
            to_base_units(Decimal::MAX, 18),
            Err(RebalanceError::Conversion(_))
        ));
    }

    #[test]
    fn test_base_unit_round_trip() {
        let samples = [
            "1",
            "999",
            "123456789",
            "1000000000000000000",
            "31415926535897932384",
        ];
        for decimals in [6, 8, 18] {
            for units in samples {
                let amount = from_base_units(units, decimals).unwrap();
                assert_eq!(to_base_units(amount, decimals).unwrap(), units);
            }
        }
    }
}
