//! The settlement layer is the external collaborator that commits a channel's final balances to a durable record
//! (typically a blockchain). The engine never constructs or signs transactions; it hands over a
//! [`SettlementIntent`] and waits for a finalize acknowledgment.

#[cfg(feature = "dummy_settlement")]
pub mod dummy_impl;
mod error;

pub use error::SettlementError;

use crate::balance::Balances;
use crate::channel::Channel;
use crate::channel_id::ChannelId;
use crate::party::PartyId;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;

/// An opaque handle the settlement layer hands back for a submitted intent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementReference(String);

impl SettlementReference {
    pub fn new(reference: impl Into<String>) -> Self {
        SettlementReference(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SettlementReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the settlement layer needs to pay out a closing channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementIntent {
    pub channel_id: ChannelId,
    pub party_a: PartyId,
    pub party_b: PartyId,
    pub final_balances: Balances,
    /// The sequence number of the state being settled.
    pub sequence: u64,
}

impl SettlementIntent {
    pub fn for_channel(channel: &Channel) -> Self {
        SettlementIntent {
            channel_id: channel.id().clone(),
            party_a: channel.party_a().clone(),
            party_b: channel.party_b().clone(),
            final_balances: channel.balances(),
            sequence: channel.sequence(),
        }
    }
}

pub trait SettlementService: Send + Sync + 'static {
    /// Submit the final state of a channel for settlement. On success, the returned reference identifies the
    /// settlement and is expected back in the finalize acknowledgment.
    fn submit(&self, intent: SettlementIntent)
        -> impl Future<Output = Result<SettlementReference, SettlementError>> + Send;
}
