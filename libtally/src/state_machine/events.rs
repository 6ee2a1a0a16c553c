use crate::helpers::Timestamp;
use crate::settlement::SettlementReference;
use crate::state_machine::closing_channel::CloseRequest;
use crate::state_machine::disputing_channel::{CounterClaim, DisputeResolution, ForceCloseInfo};
use std::fmt::{Display, Formatter};

/// Inputs to the channel lifecycle. Every status change goes through [`ChannelStatus::next`] with one of these.
///
/// [`ChannelStatus::next`]: crate::state_machine::ChannelStatus::next
#[derive(Clone, Debug)]
pub enum LifeCycleEvent {
    /// A party asked for a cooperative close.
    StartClose(Box<CloseRequest>),
    /// The settlement layer accepted the closing intent.
    SettlementSubmitted(Box<SettlementReference>),
    /// The settlement layer could not take the closing intent.
    SettlementFailed(String),
    /// The settlement layer acknowledged the final settlement, or there is no settlement layer to wait for.
    SettlementFinalized { reference: Option<SettlementReference>, at: Timestamp },
    /// A party started a unilateral close.
    ForceClose(Box<ForceCloseInfo>),
    /// The counterparty contested a force close.
    CounterClaim(Box<CounterClaim>),
    /// The monitor observed that the dispute window has passed.
    DisputeWindowElapsed(Timestamp),
    /// An explicit resolution signal for a dispute.
    DisputeResolved(Box<DisputeResolution>),
}

impl Display for LifeCycleEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LifeCycleEvent::StartClose(_) => write!(f, "OnStartClose"),
            LifeCycleEvent::SettlementSubmitted(_) => write!(f, "OnSettlementSubmitted"),
            LifeCycleEvent::SettlementFailed(_) => write!(f, "OnSettlementFailed"),
            LifeCycleEvent::SettlementFinalized { .. } => write!(f, "OnSettlementFinalized"),
            LifeCycleEvent::ForceClose(_) => write!(f, "OnForceClose"),
            LifeCycleEvent::CounterClaim(_) => write!(f, "OnCounterClaim"),
            LifeCycleEvent::DisputeWindowElapsed(_) => write!(f, "OnDisputeWindowElapsed"),
            LifeCycleEvent::DisputeResolved(_) => write!(f, "OnDisputeResolved"),
        }
    }
}
