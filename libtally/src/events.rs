use crate::amount::SatoshiAmount;
use crate::balance::Balances;
use crate::channel::Channel;
use crate::channel_id::ChannelId;
use crate::helpers::Timestamp;
use crate::party::PartyId;
use crate::payment::PaymentId;
use crate::settlement::SettlementReference;
use crate::state_machine::{ChannelClosedReason, LifecycleStage};
use log::*;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelEventKind {
    Opened,
    PaymentApplied { payment_id: PaymentId, from: PartyId, amount: SatoshiAmount },
    CloseRequested { by: PartyId },
    SettlementSubmitted(SettlementReference),
    SettlementFailed(String),
    ForceClosed { by: PartyId, reason: String },
    CounterClaimed { by: PartyId },
    Closed(ChannelClosedReason),
    FlaggedStale,
}

impl Display for ChannelEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelEventKind::Opened => write!(f, "opened"),
            ChannelEventKind::PaymentApplied { payment_id, from, amount } => {
                write!(f, "payment {payment_id} of {amount} from {from}")
            }
            ChannelEventKind::CloseRequested { by } => write!(f, "close requested by {by}"),
            ChannelEventKind::SettlementSubmitted(reference) => write!(f, "settlement submitted ({reference})"),
            ChannelEventKind::SettlementFailed(reason) => write!(f, "settlement failed ({reason})"),
            ChannelEventKind::ForceClosed { by, reason } => write!(f, "force closed by {by} ({reason})"),
            ChannelEventKind::CounterClaimed { by } => write!(f, "counter-claim by {by}"),
            ChannelEventKind::Closed(reason) => write!(f, "closed ({reason})"),
            ChannelEventKind::FlaggedStale => write!(f, "flagged stale"),
        }
    }
}

/// A structured record of something that happened to a channel, with the state it left the channel in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub kind: ChannelEventKind,
    pub channel_id: ChannelId,
    pub timestamp: Timestamp,
    pub balances: Balances,
    pub sequence: u64,
    pub stage: LifecycleStage,
}

impl ChannelEvent {
    pub fn new(kind: ChannelEventKind, channel: &Channel, timestamp: Timestamp) -> Self {
        ChannelEvent {
            kind,
            channel_id: channel.id().clone(),
            timestamp,
            balances: channel.balances(),
            sequence: channel.sequence(),
            stage: channel.stage(),
        }
    }
}

impl Display for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {}. {} seq={} stage={}",
            self.timestamp, self.channel_id, self.kind, self.balances, self.sequence, self.stage
        )
    }
}

/// Fans channel events out to any number of subscribers and writes each one to the log.
///
/// Publishing never blocks. Slow subscribers miss events rather than holding up the engine.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ChannelEvent) {
        info!("⚡️ {event}");
        // An error only means nobody is listening.
        let _ = self.sender.send(event);
    }
}
