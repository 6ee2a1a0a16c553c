use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::Add;

pub const SATS_PER_BTC: u64 = 100_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SatoshiAmount {
    /// The amount in satoshis
    amount: u64,
}

impl SatoshiAmount {
    pub const ZERO: SatoshiAmount = SatoshiAmount { amount: 0 };

    /// Creates a new `SatoshiAmount` from a value in satoshis.
    pub const fn from_sats(amount: u64) -> Self {
        SatoshiAmount { amount }
    }

    /// Converts the `SatoshiAmount` to satoshis.
    pub const fn to_sats(&self) -> u64 {
        self.amount
    }

    pub const fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Creates a new `SatoshiAmount` from a string representing whole BTC units, e.g. `"0.001"`.
    /// Returns `None` if the string is not a valid number representation or has more than 8 decimal places.
    pub fn from_btc(btc: &str) -> Option<Self> {
        let mut parts = btc.split('.');
        let whole = parts.next()?.parse::<u64>().ok()?;
        let fraction = if let Some(frac_str) = parts.next() {
            if parts.next().is_some() {
                return None; // More than one decimal point is invalid
            }
            if frac_str.is_empty() || frac_str.len() > 8 {
                return None;
            }
            if !frac_str.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            format!("{frac_str:0<8}").parse::<u64>().ok()?
        } else {
            0
        };
        let amount = whole.checked_mul(SATS_PER_BTC)?.checked_add(fraction)?;
        Some(SatoshiAmount { amount })
    }

    /// Converts the `SatoshiAmount` to whole BTC units as a tuple of (whole, fraction in sats).
    pub fn to_btc_parts(&self) -> (u64, u64) {
        (self.amount / SATS_PER_BTC, self.amount % SATS_PER_BTC)
    }

    pub fn checked_add(&self, other: SatoshiAmount) -> Option<Self> {
        self.amount.checked_add(other.amount).map(SatoshiAmount::from_sats)
    }

    pub fn checked_sub(&self, other: SatoshiAmount) -> Option<Self> {
        self.amount.checked_sub(other.amount).map(SatoshiAmount::from_sats)
    }
}

impl From<u64> for SatoshiAmount {
    fn from(amount: u64) -> Self {
        SatoshiAmount::from_sats(amount)
    }
}

/// Saturating addition. Channel totals are checked for overflow when the channel is opened, so sums of two balances
/// from the same channel never saturate.
impl Add for SatoshiAmount {
    type Output = SatoshiAmount;

    fn add(self, rhs: Self) -> Self::Output {
        SatoshiAmount::from_sats(self.amount.saturating_add(rhs.amount))
    }
}

impl Display for SatoshiAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} sats", self.amount)
    }
}
