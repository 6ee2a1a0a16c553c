use crate::helpers::Timestamp;
use crate::settlement::SettlementReference;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The terminal state. Balances are final and the record is kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedChannelState {
    reason: ChannelClosedReason,
    settlement: Option<SettlementReference>,
    closed_at: Timestamp,
}

impl ClosedChannelState {
    pub fn new(reason: ChannelClosedReason, settlement: Option<SettlementReference>, closed_at: Timestamp) -> Self {
        ClosedChannelState { reason, settlement, closed_at }
    }

    /// Get the reason for the channel being closed
    pub fn reason(&self) -> &ChannelClosedReason {
        &self.reason
    }

    pub fn settlement(&self) -> Option<&SettlementReference> {
        self.settlement.as_ref()
    }

    pub fn closed_at(&self) -> Timestamp {
        self.closed_at
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelClosedReason {
    /// Both sides agreed to close and the settlement layer finalized it
    Cooperative,
    /// A force close ran out its dispute window without a counter-claim
    DisputeWindowElapsed,
    /// A dispute was closed by an explicit resolution signal
    DisputeResolved(String),
}

impl Display for ChannelClosedReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelClosedReason::Cooperative => write!(f, "cooperative close"),
            ChannelClosedReason::DisputeWindowElapsed => write!(f, "dispute window elapsed"),
            ChannelClosedReason::DisputeResolved(note) if note.is_empty() => write!(f, "dispute resolved"),
            ChannelClosedReason::DisputeResolved(note) => write!(f, "dispute resolved ({note})"),
        }
    }
}
