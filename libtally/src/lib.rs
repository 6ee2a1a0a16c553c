//! Off-chain bilateral payment channels.
//!
//! Two parties lock funds into a channel and trade balance updates without touching the settlement layer for each
//! transfer. [`ChannelManager`] is the usual entry point.
pub mod amount;
pub mod balance;
pub mod channel;
pub mod channel_id;
pub mod clock;
pub mod closure;
pub mod config;
pub mod error;
pub mod events;
pub mod helpers;
pub mod history;
pub mod manager;
pub mod monitor;
pub mod party;
pub mod payment;
pub mod processor;
pub mod registry;
pub mod settlement;
pub mod state_machine;
pub mod storage;

pub use amount::SatoshiAmount;
pub use balance::Balances;
pub use channel::Channel;
pub use channel_id::ChannelId;
pub use error::ChannelError;
pub use manager::ChannelManager;
pub use party::{ChannelSide, PartyId};
pub use payment::{Payment, PaymentId};
