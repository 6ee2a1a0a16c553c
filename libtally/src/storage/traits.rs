use crate::channel::Channel;
use crate::channel_id::ChannelId;
use crate::payment::Payment;
use crate::storage::StorageError;

/// Durable home for channel records and their payment ledgers.
///
/// Calls for one channel are serialized by the registry's per-channel lock, so implementations only need to be
/// safe across different channels.
pub trait ChannelStore: Send + Sync {
    /// Writes the full channel record, replacing any previous version.
    fn save_channel(&self, channel: &Channel) -> Result<(), StorageError>;

    /// Atomically records an applied payment together with the channel record it produced. Either both are
    /// durable when this returns `Ok`, or neither is.
    fn commit_payment(&self, channel: &Channel, payment: &Payment) -> Result<(), StorageError>;

    /// Every stored channel, in registry index order.
    fn load_channels(&self) -> Result<Vec<Channel>, StorageError>;

    /// The ledger of a channel, in sequence order. Unknown channels have an empty ledger.
    fn load_history(&self, channel_id: &ChannelId) -> Result<Vec<Payment>, StorageError>;
}
