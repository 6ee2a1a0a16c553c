use crate::amount::SatoshiAmount;
use crate::balance::Balances;
use crate::channel_id::ChannelId;
use crate::error::ChannelError;
use crate::helpers::Timestamp;
use crate::party::{ChannelSide, PartyId};
use crate::state_machine::{ChannelStatus, LifeCycleEvent, LifecycleStage};
use log::*;
use serde::{Deserialize, Serialize};

/// A bilateral payment channel record.
///
/// Only the [`ChannelRegistry`](crate::registry::ChannelRegistry) mutates channels. Everyone else sees snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub(crate) id: ChannelId,
    pub(crate) index: u64,
    pub(crate) party_a: PartyId,
    pub(crate) party_b: PartyId,
    pub(crate) initial_balances: Balances,
    pub(crate) balances: Balances,
    pub(crate) sequence: u64,
    pub(crate) status: ChannelStatus,
    pub(crate) timeout_blocks: u64,
    pub(crate) opened_at: Timestamp,
    pub(crate) last_activity_at: Timestamp,
    #[serde(default)]
    pub(crate) stale_since: Option<Timestamp>,
}

impl Channel {
    pub(crate) fn new(
        id: ChannelId,
        index: u64,
        party_a: PartyId,
        party_b: PartyId,
        initial_balances: Balances,
        timeout_blocks: u64,
        opened_at: Timestamp,
    ) -> Self {
        Channel {
            id,
            index,
            party_a,
            party_b,
            initial_balances,
            balances: initial_balances,
            sequence: 0,
            status: ChannelStatus::Active,
            timeout_blocks,
            opened_at,
            last_activity_at: opened_at,
            stale_since: None,
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// The registry slot assigned when the channel was opened.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn party_a(&self) -> &PartyId {
        &self.party_a
    }

    pub fn party_b(&self) -> &PartyId {
        &self.party_b
    }

    pub fn party(&self, side: ChannelSide) -> &PartyId {
        match side {
            ChannelSide::A => &self.party_a,
            ChannelSide::B => &self.party_b,
        }
    }

    pub fn initial_balances(&self) -> Balances {
        self.initial_balances
    }

    pub fn balances(&self) -> Balances {
        self.balances
    }

    pub fn balance_of(&self, side: ChannelSide) -> SatoshiAmount {
        self.balances.of(side)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn status(&self) -> &ChannelStatus {
        &self.status
    }

    pub fn stage(&self) -> LifecycleStage {
        self.status.stage()
    }

    pub fn timeout_blocks(&self) -> u64 {
        self.timeout_blocks
    }

    pub fn opened_at(&self) -> Timestamp {
        self.opened_at
    }

    pub fn closed_at(&self) -> Option<Timestamp> {
        self.status.closed_at()
    }

    pub fn last_activity_at(&self) -> Timestamp {
        self.last_activity_at
    }

    pub fn stale_since(&self) -> Option<Timestamp> {
        self.stale_since
    }

    pub fn side_of(&self, party: &PartyId) -> Option<ChannelSide> {
        if party == &self.party_a {
            Some(ChannelSide::A)
        } else if party == &self.party_b {
            Some(ChannelSide::B)
        } else {
            None
        }
    }

    pub fn is_party(&self, party: &PartyId) -> bool {
        self.side_of(party).is_some()
    }

    fn unauthorized(&self, party: &PartyId) -> ChannelError {
        ChannelError::UnauthorizedParty { channel: self.id.clone(), party: party.clone() }
    }

    /// Checks a transfer without changing anything. Checks run in a fixed order: lifecycle stage, parties,
    /// amount, then funds. Returns the side that pays.
    pub fn validate_transfer(
        &self,
        from: &PartyId,
        to: &PartyId,
        amount: SatoshiAmount,
    ) -> Result<ChannelSide, ChannelError> {
        if !self.status.is_active() {
            return Err(ChannelError::ChannelClosed { channel: self.id.clone(), stage: self.stage() });
        }
        let payer = self.side_of(from).ok_or_else(|| self.unauthorized(from))?;
        match self.side_of(to) {
            Some(payee) if payee != payer => {}
            _ => return Err(self.unauthorized(to)),
        }
        if amount.is_zero() {
            return Err(ChannelError::InvalidAmount { channel: self.id.clone(), amount });
        }
        let available = self.balances.of(payer);
        if available < amount {
            return Err(ChannelError::InsufficientBalance {
                channel: self.id.clone(),
                party: from.clone(),
                attempted: amount,
                available,
            });
        }
        Ok(payer)
    }

    /// Validates and applies a transfer in place. On error the channel is untouched.
    pub(crate) fn apply_transfer(
        &mut self,
        from: &PartyId,
        to: &PartyId,
        amount: SatoshiAmount,
        at: Timestamp,
    ) -> Result<(), ChannelError> {
        let payer = self.validate_transfer(from, to, amount)?;
        let balances = self
            .balances
            .transfer(payer, amount)
            .ok_or_else(|| ChannelError::Internal(format!("Balance transfer overflowed on channel {}", self.id)))?;
        self.balances = balances;
        self.sequence += 1;
        self.last_activity_at = at;
        self.stale_since = None;
        Ok(())
    }

    /// Runs a lifecycle event through the state machine. On error the status is left as it was.
    pub(crate) fn transition(&mut self, event: LifeCycleEvent, party: Option<&PartyId>) -> Result<(), ChannelError> {
        let status = std::mem::take(&mut self.status);
        let from = status.stage();
        match status.next(event) {
            Ok(next) => {
                debug!("⚡️ Channel {} moved from {from} to {}", self.id, next.stage());
                self.status = next;
                Ok(())
            }
            Err((status, err)) => {
                self.status = status;
                Err(ChannelError::from_lifecycle(&self.id, err, party))
            }
        }
    }

    /// True when the balances still add up to what was locked at open.
    pub fn is_conserved(&self) -> bool {
        self.balances.checked_total() == self.initial_balances.checked_total()
    }
}
