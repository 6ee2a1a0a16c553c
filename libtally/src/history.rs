use crate::channel_id::ChannelId;
use crate::error::ChannelError;
use crate::payment::Payment;
use crate::storage::{ChannelStore, StorageError};
use log::*;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// The append-only ledger of applied payments, one list per channel, kept in sequence order.
///
/// Appends for a channel only ever happen under that channel's registry lock, so the ledger lock here is held
/// for a push and nothing more.
#[derive(Clone, Default)]
pub struct HistoryStore {
    ledgers: Arc<RwLock<HashMap<ChannelId, Vec<Payment>>>>,
}

fn poisoned<T>(_: T) -> ChannelError {
    ChannelError::Internal("payment history lock was poisoned".into())
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the ledgers of the given channels from the store.
    pub fn load<'a>(
        store: &dyn ChannelStore,
        channels: impl IntoIterator<Item = &'a ChannelId>,
    ) -> Result<Self, StorageError> {
        let mut ledgers = HashMap::new();
        for id in channels {
            let payments = store.load_history(id)?;
            trace!("Loaded {} payments for channel {id}", payments.len());
            ledgers.insert(id.clone(), payments);
        }
        Ok(Self { ledgers: Arc::new(RwLock::new(ledgers)) })
    }

    /// The payments applied to a channel, oldest first. Unknown channels have an empty history.
    pub fn get_history(&self, channel_id: &ChannelId) -> Result<Vec<Payment>, ChannelError> {
        let ledgers = self.ledgers.read().map_err(poisoned)?;
        Ok(ledgers.get(channel_id).cloned().unwrap_or_default())
    }

    /// Confirms that `payment` is the next entry for its channel, i.e. its sequence number follows the last one
    /// recorded without a gap.
    pub(crate) fn check_next(&self, payment: &Payment) -> Result<(), ChannelError> {
        let ledgers = self.ledgers.read().map_err(poisoned)?;
        let last = ledgers.get(&payment.channel_id).and_then(|l| l.last()).map(|p| p.sequence).unwrap_or(0);
        if payment.sequence != last + 1 {
            return Err(ChannelError::Internal(format!(
                "Ledger for {} ends at sequence {last}, cannot append sequence {}",
                payment.channel_id, payment.sequence
            )));
        }
        Ok(())
    }

    pub(crate) fn append(&self, payment: Payment) -> Result<(), ChannelError> {
        let mut ledgers = self.ledgers.write().map_err(poisoned)?;
        ledgers.entry(payment.channel_id.clone()).or_default().push(payment);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amount::SatoshiAmount;
    use crate::balance::Balances;
    use crate::helpers::Timestamp;

    fn payment(id: &ChannelId, sequence: u64) -> Payment {
        let amount = SatoshiAmount::from_sats(10);
        Payment::new(id.clone(), "alice".into(), "bob".into(), amount, None, sequence, Timestamp::new(sequence))
    }

    #[test]
    fn appends_must_be_gapless() {
        let id = ChannelId::derive(&"alice".into(), &"bob".into(), Balances::default(), Timestamp::new(0), 0);
        let history = HistoryStore::new();
        assert!(history.check_next(&payment(&id, 2)).is_err());
        history.check_next(&payment(&id, 1)).expect("first payment");
        history.append(payment(&id, 1)).unwrap();
        assert!(history.check_next(&payment(&id, 1)).is_err());
        history.check_next(&payment(&id, 2)).expect("second payment");
        history.append(payment(&id, 2)).unwrap();
        let ledger = history.get_history(&id).unwrap();
        assert_eq!(ledger.iter().map(|p| p.sequence).collect::<Vec<_>>(), vec![1, 2]);
    }
}
