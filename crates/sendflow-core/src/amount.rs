use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::AmountError;

pub const ARRRTOSHI_PER_ARRR: u64 = 100_000_000;
pub const DECIMALS: usize = 8;
pub const ARRRTOSHI_MAX: u64 = 200_000_000 * ARRRTOSHI_PER_ARRR;

/// Integer count of arrrtoshis. Zero is allowed so the same type carries
/// fees and balances; recipient amounts are checked for zero separately.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u64", into = "u64")]
pub struct Arrrtoshi(u64);

/// Exact rational multiplier used for fee presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub numer: u64,
    pub denom: u64,
}

impl Ratio {
    pub const HALF: Ratio = Ratio { numer: 1, denom: 2 };
    pub const ONE: Ratio = Ratio { numer: 1, denom: 1 };
    pub const DOUBLE: Ratio = Ratio { numer: 2, denom: 1 };

    pub const fn new(numer: u64, denom: u64) -> Self {
        Self { numer, denom }
    }
}

impl Arrrtoshi {
    pub const ZERO: Arrrtoshi = Arrrtoshi(0);
    pub const MAX: Arrrtoshi = Arrrtoshi(ARRRTOSHI_MAX);

    pub fn new(value: u64) -> Result<Self, AmountError> {
        if value > ARRRTOSHI_MAX {
            return Err(AmountError::AboveMaximum { value });
        }
        Ok(Self(value))
    }

    pub fn from_decimal_str(input: &str) -> Result<Self, AmountError> {
        let (whole, fraction) = split_decimal(input)?;
        if fraction.len() > DECIMALS {
            return Err(AmountError::TooManyDecimals {
                decimals: fraction.len(),
            });
        }
        Self::from_parts(whole, fraction)
    }

    /// Parse a decimal string, truncating fractional digits beyond eight.
    /// Used when a computed maximum is fed back into a field; never rounds up.
    pub fn floor_from_decimal_str(input: &str) -> Result<Self, AmountError> {
        let (whole, fraction) = split_decimal(input)?;
        let kept = if fraction.len() > DECIMALS {
            &fraction[..DECIMALS]
        } else {
            fraction
        };
        Self::from_parts(whole, kept)
    }

    fn from_parts(whole: &str, fraction: &str) -> Result<Self, AmountError> {
        let whole_units = if whole.is_empty() {
            0
        } else {
            parse_u64_digits(whole)?
                .checked_mul(ARRRTOSHI_PER_ARRR)
                .ok_or(AmountError::Overflow)?
        };

        let frac_units = if fraction.is_empty() {
            0
        } else {
            let mut padded = fraction.to_string();
            while padded.len() < DECIMALS {
                padded.push('0');
            }
            parse_u64_digits(&padded)?
        };

        let combined = whole_units
            .checked_add(frac_units)
            .ok_or(AmountError::Overflow)?;
        Self::new(combined)
    }

    pub fn to_decimal_string(&self) -> String {
        let whole = self.0 / ARRRTOSHI_PER_ARRR;
        let frac = self.0 % ARRRTOSHI_PER_ARRR;
        if frac == 0 {
            return whole.to_string();
        }

        let mut frac_str = format!("{frac:08}");
        while frac_str.ends_with('0') {
            frac_str.pop();
        }
        format!("{whole}.{frac_str}")
    }

    pub fn to_fixed_string(&self) -> String {
        format!(
            "{}.{:08}",
            self.0 / ARRRTOSHI_PER_ARRR,
            self.0 % ARRRTOSHI_PER_ARRR
        )
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Arrrtoshi) -> Result<Arrrtoshi, AmountError> {
        let sum = self.0.checked_add(other.0).ok_or(AmountError::Overflow)?;
        Arrrtoshi::new(sum)
    }

    pub fn saturating_add(self, other: Arrrtoshi) -> Arrrtoshi {
        Arrrtoshi(self.0.saturating_add(other.0).min(ARRRTOSHI_MAX))
    }

    pub fn saturating_sub(self, other: Arrrtoshi) -> Arrrtoshi {
        Arrrtoshi(self.0.saturating_sub(other.0))
    }

    pub fn saturating_mul(self, factor: u64) -> Arrrtoshi {
        Arrrtoshi(self.0.saturating_mul(factor).min(ARRRTOSHI_MAX))
    }

    pub fn scale_floor(self, ratio: Ratio) -> Result<Arrrtoshi, AmountError> {
        if ratio.denom == 0 {
            return Err(AmountError::InvalidFormat);
        }
        let scaled = u128::from(self.0) * u128::from(ratio.numer) / u128::from(ratio.denom);
        Self::from_u128(scaled)
    }

    /// Scale by `ratio`, rounding halves up.
    pub fn scale_round(self, ratio: Ratio) -> Result<Arrrtoshi, AmountError> {
        if ratio.denom == 0 {
            return Err(AmountError::InvalidFormat);
        }
        let denom = u128::from(ratio.denom);
        let product = u128::from(self.0) * u128::from(ratio.numer);
        Self::from_u128((product + denom / 2) / denom)
    }

    fn from_u128(value: u128) -> Result<Arrrtoshi, AmountError> {
        let narrowed = u64::try_from(value).map_err(|_| AmountError::Overflow)?;
        Self::new(narrowed)
    }

    pub fn checked_sum<I>(iter: I) -> Result<Arrrtoshi, AmountError>
    where
        I: IntoIterator<Item = Arrrtoshi>,
    {
        iter.into_iter()
            .try_fold(Arrrtoshi::ZERO, |acc, value| acc.checked_add(value))
    }
}

impl TryFrom<u64> for Arrrtoshi {
    type Error = AmountError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Arrrtoshi> for u64 {
    fn from(value: Arrrtoshi) -> Self {
        value.0
    }
}

impl Display for Arrrtoshi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

fn split_decimal(input: &str) -> Result<(&str, &str), AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::EmptyInput);
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::NegativeNotAllowed);
    }

    let mut parts = trimmed.split('.');
    let whole = parts.next().ok_or(AmountError::InvalidFormat)?;
    let fraction = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return Err(AmountError::InvalidFormat);
    }
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::InvalidFormat);
    }
    if !whole.bytes().all(|byte| byte.is_ascii_digit())
        || !fraction.bytes().all(|byte| byte.is_ascii_digit())
    {
        return Err(AmountError::InvalidNumeric);
    }
    Ok((whole, fraction))
}

fn parse_u64_digits(input: &str) -> Result<u64, AmountError> {
    if !input.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(AmountError::InvalidNumeric);
    }
    input.parse::<u64>().map_err(|_| AmountError::Overflow)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{AmountError, Arrrtoshi, Ratio, ARRRTOSHI_MAX, ARRRTOSHI_PER_ARRR};

    #[test]
    fn creation_accepts_zero_and_max() {
        assert_eq!(Arrrtoshi::new(0).unwrap(), Arrrtoshi::ZERO);
        assert_eq!(Arrrtoshi::new(ARRRTOSHI_MAX).unwrap().as_u64(), ARRRTOSHI_MAX);
        assert!(matches!(
            Arrrtoshi::new(ARRRTOSHI_MAX + 1),
            Err(AmountError::AboveMaximum { value }) if value == ARRRTOSHI_MAX + 1
        ));
    }

    #[test]
    fn parses_valid_decimal_strings() {
        assert_eq!(Arrrtoshi::from_decimal_str("1").unwrap().as_u64(), 100_000_000);
        assert_eq!(Arrrtoshi::from_decimal_str("1.0").unwrap().as_u64(), 100_000_000);
        assert_eq!(Arrrtoshi::from_decimal_str("1.5").unwrap().as_u64(), 150_000_000);
        assert_eq!(Arrrtoshi::from_decimal_str(".5").unwrap().as_u64(), 50_000_000);
        assert_eq!(Arrrtoshi::from_decimal_str("2.").unwrap().as_u64(), 200_000_000);
        assert_eq!(Arrrtoshi::from_decimal_str("0.00000001").unwrap().as_u64(), 1);
        assert_eq!(
            Arrrtoshi::from_decimal_str(" 1.12345678 ").unwrap().as_u64(),
            112_345_678
        );
        assert_eq!(
            Arrrtoshi::from_decimal_str("200000000").unwrap().as_u64(),
            ARRRTOSHI_MAX
        );
    }

    #[test]
    fn rejects_invalid_decimal_strings() {
        assert!(matches!(
            Arrrtoshi::from_decimal_str("0.123456789"),
            Err(AmountError::TooManyDecimals { decimals: 9 })
        ));
        assert!(matches!(
            Arrrtoshi::from_decimal_str("-1"),
            Err(AmountError::NegativeNotAllowed)
        ));
        assert!(matches!(
            Arrrtoshi::from_decimal_str("  "),
            Err(AmountError::EmptyInput)
        ));
        assert!(matches!(
            Arrrtoshi::from_decimal_str("abc"),
            Err(AmountError::InvalidNumeric)
        ));
        assert!(matches!(
            Arrrtoshi::from_decimal_str("+1"),
            Err(AmountError::InvalidNumeric)
        ));
        assert!(matches!(
            Arrrtoshi::from_decimal_str("1e5"),
            Err(AmountError::InvalidNumeric)
        ));
        assert!(matches!(
            Arrrtoshi::from_decimal_str("1.2.3"),
            Err(AmountError::InvalidFormat)
        ));
        assert!(matches!(
            Arrrtoshi::from_decimal_str("."),
            Err(AmountError::InvalidFormat)
        ));
        assert!(matches!(
            Arrrtoshi::from_decimal_str("200000000.00000001"),
            Err(AmountError::AboveMaximum { .. })
        ));
        assert!(matches!(
            Arrrtoshi::from_decimal_str("99999999999999999999"),
            Err(AmountError::Overflow)
        ));
    }

    #[test]
    fn floor_parse_truncates_extra_digits() {
        assert_eq!(
            Arrrtoshi::floor_from_decimal_str("0.123456789").unwrap().as_u64(),
            12_345_678
        );
        assert_eq!(
            Arrrtoshi::floor_from_decimal_str("1.999999999999").unwrap().as_u64(),
            199_999_999
        );
        assert!(Arrrtoshi::floor_from_decimal_str("-0.1").is_err());
    }

    #[test]
    fn formats_with_and_without_padding() {
        let one = Arrrtoshi::new(ARRRTOSHI_PER_ARRR).unwrap();
        let fee = Arrrtoshi::new(10_000).unwrap();

        assert_eq!(one.to_decimal_string(), "1");
        assert_eq!(fee.to_decimal_string(), "0.0001");
        assert_eq!(fee.to_fixed_string(), "0.00010000");
        assert_eq!(Arrrtoshi::ZERO.to_fixed_string(), "0.00000000");
        assert_eq!(one.to_string(), "1");
    }

    #[test]
    fn subtraction_saturates_at_zero() {
        let small = Arrrtoshi::new(5).unwrap();
        let large = Arrrtoshi::new(9).unwrap();
        assert_eq!(small.saturating_sub(large), Arrrtoshi::ZERO);
        assert_eq!(large.saturating_sub(small).as_u64(), 4);
    }

    #[test]
    fn scaling_is_exact() {
        let base = Arrrtoshi::new(10_001).unwrap();
        assert_eq!(base.scale_floor(Ratio::HALF).unwrap().as_u64(), 5_000);
        assert_eq!(base.scale_round(Ratio::HALF).unwrap().as_u64(), 5_001);
        assert_eq!(base.scale_round(Ratio::DOUBLE).unwrap().as_u64(), 20_002);
        assert!(matches!(
            Arrrtoshi::MAX.scale_round(Ratio::DOUBLE),
            Err(AmountError::AboveMaximum { .. })
        ));
        assert!(base.scale_floor(Ratio::new(1, 0)).is_err());
    }

    #[test]
    fn checked_sum_reports_overflow() {
        let values = [Arrrtoshi::MAX, Arrrtoshi::new(1).unwrap()];
        assert!(Arrrtoshi::checked_sum(values).is_err());
        assert_eq!(
            Arrrtoshi::checked_sum([Arrrtoshi::new(2).unwrap(), Arrrtoshi::new(3).unwrap()])
                .unwrap()
                .as_u64(),
            5
        );
        assert_eq!(Arrrtoshi::checked_sum([]).unwrap(), Arrrtoshi::ZERO);
    }

    #[test]
    fn serde_uses_raw_units() {
        let amount = Arrrtoshi::new(150_000_000).unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "150000000");
        let parsed: Arrrtoshi = serde_json::from_str("150000000").unwrap();
        assert_eq!(parsed, amount);
        assert!(serde_json::from_str::<Arrrtoshi>("20000000000000001").is_err());
    }

    proptest! {
        #[test]
        fn decimal_string_roundtrips(value in 0..=ARRRTOSHI_MAX) {
            let amount = Arrrtoshi::new(value).expect("generated amount must be valid");
            let reparsed = Arrrtoshi::from_decimal_str(&amount.to_decimal_string())
                .expect("roundtrip parse should succeed");
            prop_assert_eq!(reparsed, amount);
            let fixed = Arrrtoshi::from_decimal_str(&amount.to_fixed_string())
                .expect("fixed parse should succeed");
            prop_assert_eq!(fixed, amount);
        }

        #[test]
        fn floor_parse_never_exceeds_exact_value(whole in 0u64..1_000, frac in 0u64..1_000_000_000_000) {
            let text = format!("{whole}.{frac:012}");
            let floored = Arrrtoshi::floor_from_decimal_str(&text).unwrap();
            let exact_scaled = u128::from(whole) * 1_000_000_000_000 + u128::from(frac);
            prop_assert!(u128::from(floored.as_u64()) * 10_000 <= exact_scaled);
            prop_assert!(exact_scaled < (u128::from(floored.as_u64()) + 1) * 10_000);
        }
    }
}
