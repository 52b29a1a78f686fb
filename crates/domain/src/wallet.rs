use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

/// Fixed-point amount with exactly three decimal places, stored as
/// thousandths in an `i64`. Wallet balances must never go negative (see
/// the spec's invariant); using integer milli-units instead of `f64`
/// (the teacher's quota tracker uses `f64` for advisory cost figures)
/// makes that invariant exact rather than approximate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Decimal3(i64);

impl Decimal3 {
    pub const ZERO: Decimal3 = Decimal3(0);

    pub fn from_millis(millis: i64) -> Self {
        Decimal3(millis)
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Decimal3) -> Option<Decimal3> {
        self.0.checked_add(other.0).map(Decimal3)
    }

    /// Subtract, failing (returning `None`) rather than allowing the
    /// balance to go negative.
    pub fn checked_sub(self, other: Decimal3) -> Option<Decimal3> {
        if self.0 < other.0 {
            None
        } else {
            Some(Decimal3(self.0 - other.0))
        }
    }
}

impl fmt::Display for Decimal3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let whole = abs / 1000;
        let frac = abs % 1000;
        if negative {
            write!(f, "-{whole}.{frac:03}")
        } else {
            write!(f, "{whole}.{frac:03}")
        }
    }
}

impl FromStr for Decimal3 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let negative = s.starts_with('-');
        let s = s.strip_prefix('-').unwrap_or(s);
        let mut parts = s.splitn(2, '.');
        let whole: i64 = parts
            .next()
            .unwrap_or("0")
            .parse()
            .map_err(|_| format!("invalid decimal: {s}"))?;
        let frac_str = parts.next().unwrap_or("0");
        if frac_str.len() > 3 {
            return Err(format!("at most 3 decimal places allowed: {s}"));
        }
        let frac_padded = format!("{frac_str:0<3}");
        let frac: i64 = frac_padded
            .parse()
            .map_err(|_| format!("invalid decimal: {s}"))?;
        let millis = whole * 1000 + frac;
        Ok(Decimal3(if negative { -millis } else { millis }))
    }
}

impl Serialize for Decimal3 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Decimal3 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Decimal3::from_str(&s).map_err(D::Error::custom)
    }
}

/// Per-agent wallet. Invariant: `balance >= Decimal3::ZERO` after any
/// successful deduction — enforced by `gov-wallet`'s atomic
/// read-check-write, not by this type alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub owner_id: String,
    pub balance: Decimal3,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_round_trip() {
        let d: Decimal3 = "100.000".parse().unwrap();
        assert_eq!(d.to_string(), "100.000");
        assert_eq!(d.millis(), 100_000);
    }

    #[test]
    fn parses_short_fraction() {
        let d: Decimal3 = "0.5".parse().unwrap();
        assert_eq!(d.to_string(), "0.500");
    }

    #[test]
    fn checked_sub_rejects_negative_result() {
        let a: Decimal3 = "1.000".parse().unwrap();
        let b: Decimal3 = "2.000".parse().unwrap();
        assert!(a.checked_sub(b).is_none());
        assert_eq!(b.checked_sub(a), Some("1.000".parse().unwrap()));
    }

    #[test]
    fn rejects_too_many_decimal_places() {
        assert!("1.2345".parse::<Decimal3>().is_err());
    }
}
