use crate::amount::SatoshiAmount;
use crate::channel_id::ChannelId;
use crate::helpers::Timestamp;
use crate::party::PartyId;
use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

const PAYMENT_ID_BYTES: usize = 16;

/// Identifies a payment. Derived from the channel and the sequence number the payment produced, so every
/// replay of the same commit yields the same id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn derive(channel_id: &ChannelId, sequence: u64) -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(b"Tally PaymentId v1");
        hasher.update(channel_id.name().as_bytes());
        hasher.update(sequence.to_le_bytes());
        let hash = hasher.finalize();
        PaymentId(hex::encode(&hash[..PAYMENT_ID_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An applied payment. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub channel_id: ChannelId,
    pub from: PartyId,
    pub to: PartyId,
    pub amount: SatoshiAmount,
    #[serde(default)]
    pub memo: Option<String>,
    /// The channel sequence number after this payment was applied.
    pub sequence: u64,
    pub applied_at: Timestamp,
}

impl Payment {
    pub fn new(
        channel_id: ChannelId,
        from: PartyId,
        to: PartyId,
        amount: SatoshiAmount,
        memo: Option<String>,
        sequence: u64,
        applied_at: Timestamp,
    ) -> Self {
        let id = PaymentId::derive(&channel_id, sequence);
        Payment { id, channel_id, from, to, amount, memo, sequence, applied_at }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::balance::Balances;

    #[test]
    fn payment_ids_follow_channel_and_sequence() {
        let initial = Balances::new(SatoshiAmount::from_sats(10), SatoshiAmount::ZERO);
        let ch1 = ChannelId::derive(&"alice".into(), &"bob".into(), initial, Timestamp::new(1), 1);
        let ch2 = ChannelId::derive(&"alice".into(), &"bob".into(), initial, Timestamp::new(1), 2);
        assert_eq!(PaymentId::derive(&ch1, 1), PaymentId::derive(&ch1, 1));
        assert_ne!(PaymentId::derive(&ch1, 1), PaymentId::derive(&ch1, 2));
        assert_ne!(PaymentId::derive(&ch1, 1), PaymentId::derive(&ch2, 1));
        assert_eq!(PaymentId::derive(&ch1, 7).as_str().len(), 32);
    }
}
