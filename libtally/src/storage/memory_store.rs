use crate::channel::Channel;
use crate::channel_id::ChannelId;
use crate::payment::Payment;
use crate::storage::{ChannelStore, StorageError};
use std::collections::HashMap;
use std::sync::RwLock;

/// A store that keeps everything in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    channels: RwLock<HashMap<ChannelId, Channel>>,
    history: RwLock<HashMap<ChannelId, Vec<Payment>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Unavailable("memory store lock was poisoned".into())
}

impl ChannelStore for MemoryStore {
    fn save_channel(&self, channel: &Channel) -> Result<(), StorageError> {
        let mut channels = self.channels.write().map_err(poisoned)?;
        channels.insert(channel.id().clone(), channel.clone());
        Ok(())
    }

    fn commit_payment(&self, channel: &Channel, payment: &Payment) -> Result<(), StorageError> {
        // Both locks are taken before anything changes.
        let mut channels = self.channels.write().map_err(poisoned)?;
        let mut history = self.history.write().map_err(poisoned)?;
        history.entry(channel.id().clone()).or_default().push(payment.clone());
        channels.insert(channel.id().clone(), channel.clone());
        Ok(())
    }

    fn load_channels(&self) -> Result<Vec<Channel>, StorageError> {
        let channels = self.channels.read().map_err(poisoned)?;
        let mut result = channels.values().cloned().collect::<Vec<_>>();
        result.sort_by_key(|c| c.index());
        Ok(result)
    }

    fn load_history(&self, channel_id: &ChannelId) -> Result<Vec<Payment>, StorageError> {
        let history = self.history.read().map_err(poisoned)?;
        Ok(history.get(channel_id).cloned().unwrap_or_default())
    }
}
