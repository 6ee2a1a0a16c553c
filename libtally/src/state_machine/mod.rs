//! The channel lifecycle: `Active → Closing → Closed` for cooperative closes and `Active → Disputed → Closed` for
//! unilateral ones. Every transition is decided by [`ChannelStatus::next`].
mod closed_channel;
mod closing_channel;
mod disputing_channel;
pub mod error;
mod events;
pub mod lifecycle;

pub use closed_channel::{ChannelClosedReason, ClosedChannelState};
pub use closing_channel::{CloseRequest, ClosingChannelState};
pub use disputing_channel::{CounterClaim, DisputeResolution, DisputingChannelState, ForceCloseInfo};
pub use error::LifeCycleError;
pub use events::LifeCycleEvent;
pub use lifecycle::{ChannelStatus, LifecycleStage};
