//! # Types
//!
//! Core domain types shared across Piri's storage-and-proof control plane:
//! configuration keys and change events, rail/account settlement views, and
//! the network presets the registrar and installer key off of.
//!
//! ## Serialization
//!
//! Most types implement `Serialize`/`Deserialize` for persistence and for
//! the admin HTTP surface. Token amounts and epoch counters are carried as
//! [`Amount`] (a base-unit, arbitrary-precision integer) end to end — they
//! are never widened to a float anywhere in this crate.
//!
//! ## Stability
//!
//! These types are considered stable unless otherwise noted.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A base-unit, arbitrary-precision token amount (18-decimal token, but the
/// decimal count is a rendering concern, not one this type enforces).
///
/// Exchanged on the wire as a decimal integer string so that no amount is
/// ever rounded through a float; see Design Notes §9 of the spec.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(pub BigUint);

impl Amount {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_u64(v: u64) -> Self {
        Self(BigUint::from(v))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Saturating subtraction: `max(0, self - other)`.
    pub fn saturating_sub(&self, other: &Amount) -> Amount {
        if self.0 >= other.0 {
            Amount(&self.0 - &other.0)
        } else {
            Amount::zero()
        }
    }

    pub fn checked_add(&self, other: &Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }

    pub fn checked_mul_epochs(&self, epochs: u64) -> Amount {
        Amount(&self.0 * BigUint::from(epochs))
    }

    /// `ceil(self / divisor)`.
    pub fn div_ceil(&self, divisor: u64) -> Amount {
        if divisor == 0 {
            return Amount::zero();
        }
        let divisor = BigUint::from(divisor);
        let (q, r) = (&self.0 / &divisor, &self.0 % &divisor);
        if r.is_zero() { Amount(q) } else { Amount(q + BigUint::from(1u8)) }
    }

    /// Integer percentage reduction `floor((a - b) * 100 / a)`, or 0 if `a` is zero.
    pub fn pct_reduction(gross: &Amount, net: &Amount) -> u64 {
        if gross.is_zero() {
            return 0;
        }
        let diff = gross.saturating_sub(net);
        let scaled = &diff.0 * BigUint::from(100u8);
        (&scaled / &gross.0).try_into().unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = s
            .parse::<BigUint>()
            .map_err(|e| anyhow::anyhow!("invalid base-unit amount {:?}: {}", s, e))?;
        Ok(Amount(v))
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The chain's block-like unit of time. All rail arithmetic is in epochs.
pub type Epoch = u64;

/// Opaque rail identifier.
pub type RailId = u64;

/// A one-way payment stream from a payer to this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rail {
    pub rail_id: RailId,
    pub from: String,
    pub to: String,
    pub operator: String,
    pub validator: String,
    pub payment_rate_per_epoch: Amount,
    pub lockup_period: Epoch,
    pub lockup_fixed: Amount,
    pub settled_up_to_epoch: Epoch,
    pub end_epoch: Epoch,
    pub commission_bps: u32,
    pub service_fee_recipient: String,
    pub is_terminated: bool,
}

/// A payer's on-chain account view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub funds: Amount,
    pub lockup_current: Amount,
    pub lockup_rate: Amount,
    pub lockup_last_settled_at: Epoch,
}

impl Account {
    /// `max(0, funds - lockup_current)`.
    pub fn available_to_withdraw(&self) -> Amount {
        self.funds.saturating_sub(&self.lockup_current)
    }
}

/// A configuration key: a dot-separated, flat identifier that maps to a
/// nested table when persisted (`pdp.aggregation.manager.poll_interval`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigKey(String);

impl ConfigKey {
    /// Builds a key, rejecting the reserved empty segment.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConfigKeyError> {
        let raw = raw.into();
        if raw.is_empty() || raw.split('.').any(|seg| seg.is_empty()) {
            return Err(ConfigKeyError::EmptySegment(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dot-separated path segments, for mapping into a nested document.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigKeyError {
    #[error("config key has an empty segment: {0:?}")]
    EmptySegment(String),
}

/// Where a configuration change originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Api,
    File,
}

/// A network preset the registrar can initialize against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Calibration,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Calibration => write!(f, "calibration"),
        }
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "calibration" => Ok(Network::Calibration),
            other => Err(anyhow::anyhow!("unknown network preset: {}", other)),
        }
    }
}

/// Settlement/withdrawal wait status, as reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStatus {
    None,
    Pending,
    Confirmed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_parses_and_displays_round_trip() {
        let a: Amount = "123456789012345678901234".parse().unwrap();
        assert_eq!(a.to_string(), "123456789012345678901234");
    }

    #[test]
    fn amount_saturating_sub_never_goes_negative() {
        let a = Amount::from_u64(5);
        let b = Amount::from_u64(10);
        assert_eq!(a.saturating_sub(&b), Amount::zero());
    }

    #[test]
    fn amount_div_ceil_rounds_up() {
        let a = Amount::from_u64(201);
        assert_eq!(a.div_ceil(200), Amount::from_u64(2));
        let exact = Amount::from_u64(400);
        assert_eq!(exact.div_ceil(200), Amount::from_u64(2));
    }

    #[test]
    fn amount_pct_reduction_is_zero_when_equal() {
        let gross = Amount::from_u64(1000);
        assert_eq!(Amount::pct_reduction(&gross, &gross), 0);
    }

    #[test]
    fn amount_serde_round_trips_as_string() {
        let a = Amount::from_u64(42);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"42\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn config_key_rejects_empty_segments() {
        assert!(ConfigKey::new("pdp..poll_interval").is_err());
        assert!(ConfigKey::new("").is_err());
        assert!(ConfigKey::new("pdp.aggregation.manager.poll_interval").is_ok());
    }

    #[test]
    fn config_key_segments_split_on_dot() {
        let key = ConfigKey::new("pdp.aggregation.manager.poll_interval").unwrap();
        let segs: Vec<&str> = key.segments().collect();
        assert_eq!(segs, vec!["pdp", "aggregation", "manager", "poll_interval"]);
    }

    #[test]
    fn account_available_to_withdraw_is_clamped() {
        let account = Account {
            funds: Amount::from_u64(5),
            lockup_current: Amount::from_u64(10),
            lockup_rate: Amount::zero(),
            lockup_last_settled_at: 0,
        };
        assert_eq!(account.available_to_withdraw(), Amount::zero());
    }

    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn amount_round_trips_through_decimal_string(digits in "[1-9][0-9]{0,30}") {
                let amount: Amount = digits.parse().unwrap();
                prop_assert_eq!(amount.to_string(), digits);
            }

            #[test]
            fn div_ceil_is_never_smaller_than_exact_division(value in 0u64..1_000_000, divisor in 1u64..1000) {
                let amount = Amount::from_u64(value);
                let ceil = amount.div_ceil(divisor);
                let exact_times_divisor = BigUint::from(divisor) * &ceil.0;
                prop_assert!(exact_times_divisor >= amount.0);
            }
        }
    }
}
