use crate::amount::SatoshiAmount;
use crate::party::ChannelSide;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

//------------------------------------           Balances          ------------------------------------------------//
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub party_a: SatoshiAmount,
    pub party_b: SatoshiAmount,
}

impl Balances {
    pub fn new(party_a: SatoshiAmount, party_b: SatoshiAmount) -> Self {
        Balances { party_a, party_b }
    }

    pub fn total(&self) -> SatoshiAmount {
        self.party_a + self.party_b
    }

    /// The total, or `None` if the two balances cannot be summed without overflowing.
    pub fn checked_total(&self) -> Option<SatoshiAmount> {
        self.party_a.checked_add(self.party_b)
    }

    pub fn of(&self, side: ChannelSide) -> SatoshiAmount {
        match side {
            ChannelSide::A => self.party_a,
            ChannelSide::B => self.party_b,
        }
    }

    /// Moves `amount` from `from` to the other side. Returns `None` if `from` cannot cover the amount.
    ///
    /// The total is preserved by construction.
    pub fn transfer(&self, from: ChannelSide, amount: SatoshiAmount) -> Option<Self> {
        let payer = self.of(from).checked_sub(amount)?;
        let payee = self.of(from.other()).checked_add(amount)?;
        let result = match from {
            ChannelSide::A => Balances::new(payer, payee),
            ChannelSide::B => Balances::new(payee, payer),
        };
        Some(result)
    }
}

impl Display for Balances {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "A: {} / B: {}", self.party_a, self.party_b)
    }
}
