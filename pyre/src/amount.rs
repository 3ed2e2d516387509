//! Integer token amounts.
//!
//! All accounting in this crate happens on [`TokenAmount`], a count of token
//! *minor units* (the smallest indivisible unit of an SPL token, `10^-decimals`
//! of a whole token). Binary floating point is never used for token amounts;
//! values shown to clients are rendered through [`rust_decimal::Decimal`].

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::iter::Sum;
use std::str::FromStr;

/// A non-negative amount of token minor units.
///
/// # Serialization
///
/// Serialized as a stringified integer, since `JavaScript` clients cannot
/// represent every 128-bit (or even 64-bit) integer as a `Number`.
///
/// ```json
/// "6000000000"
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from a raw count of minor units.
    #[must_use]
    pub const fn new(minor_units: u128) -> Self {
        Self(minor_units)
    }

    /// Converts a count of whole tokens into minor units.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub fn from_whole_tokens(tokens: u64, decimals: u8) -> Option<Self> {
        10u128
            .checked_pow(u32::from(decimals))
            .and_then(|scale| u128::from(tokens).checked_mul(scale))
            .map(Self)
    }

    /// Returns the raw count of minor units.
    #[must_use]
    pub const fn minor_units(&self) -> u128 {
        self.0
    }

    /// Returns `true` if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Adds two amounts, saturating at `u128::MAX`.
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Subtracts two amounts, saturating at zero.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Returns `percent`% of this amount, truncated toward zero.
    #[must_use]
    pub const fn percent(self, percent: u8) -> Self {
        // Dividing first keeps the intermediate product in range for any u128.
        let whole = (self.0 / 100) * percent as u128;
        let part = (self.0 % 100) * percent as u128 / 100;
        Self(whole + part)
    }

    /// Divides the amount by `divisor`, truncating. Division by zero yields zero.
    #[must_use]
    pub const fn div_floor(self, divisor: u128) -> Self {
        match self.0.checked_div(divisor) {
            Some(v) => Self(v),
            None => Self(0),
        }
    }

    /// Renders the amount in whole tokens for display.
    ///
    /// Trailing zeros are stripped, so `6_000_000_000` with 9 decimals renders
    /// as `6`. Values beyond the range of [`Decimal`] saturate at
    /// [`Decimal::MAX`].
    #[must_use]
    pub fn to_decimal(&self, decimals: u8) -> Decimal {
        i128::try_from(self.0)
            .ok()
            .and_then(|v| Decimal::try_from_i128_with_scale(v, u32::from(decimals)).ok())
            .map_or(Decimal::MAX, |d| d.normalize())
    }

    /// Converts a display value in whole tokens back into minor units,
    /// truncating any precision beyond `decimals`.
    ///
    /// Returns `None` for negative values or on overflow.
    #[must_use]
    pub fn from_decimal(value: Decimal, decimals: u8) -> Option<Self> {
        if value.is_sign_negative() {
            return None;
        }
        let scale = Decimal::from(10u64.checked_pow(u32::from(decimals))?);
        let minor = value.checked_mul(scale)?.trunc();
        minor.to_string().parse::<u128>().ok().map(Self)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Self)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<Self>()
            .map_err(|_| serde::de::Error::custom("token amount must be a non-negative integer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_whole_tokens() {
        let amount = TokenAmount::from_whole_tokens(20, 9).unwrap();
        assert_eq!(amount.minor_units(), 20_000_000_000);
        assert_eq!(TokenAmount::from_whole_tokens(5, 0).unwrap().minor_units(), 5);
    }

    #[test]
    fn test_from_whole_tokens_overflow() {
        assert!(TokenAmount::from_whole_tokens(u64::MAX, 38).is_none());
    }

    #[test]
    fn test_percent_truncates() {
        assert_eq!(TokenAmount::new(20).percent(30), TokenAmount::new(6));
        assert_eq!(TokenAmount::new(7).percent(30), TokenAmount::new(2));
        assert_eq!(TokenAmount::new(u128::MAX).percent(100), TokenAmount::new(u128::MAX));
    }

    #[test]
    fn test_to_decimal_strips_trailing_zeros() {
        let amount = TokenAmount::new(6_000_000_000);
        assert_eq!(amount.to_decimal(9).to_string(), "6");
        let amount = TokenAmount::new(1_500_000_000);
        assert_eq!(amount.to_decimal(9).to_string(), "1.5");
    }

    #[test]
    fn test_from_decimal_truncates() {
        let value = Decimal::new(12_345, 4); // 1.2345
        assert_eq!(TokenAmount::from_decimal(value, 2), Some(TokenAmount::new(123)));
        assert_eq!(TokenAmount::from_decimal(Decimal::NEGATIVE_ONE, 2), None);
    }

    #[test]
    fn test_serialize_as_string() {
        let json = serde_json::to_string(&TokenAmount::new(42)).unwrap();
        assert_eq!(json, "\"42\"");
        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TokenAmount::new(42));
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        let result: Result<TokenAmount, _> = serde_json::from_str("\"-1\"");
        assert!(result.is_err());
    }
}
