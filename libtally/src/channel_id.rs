use crate::balance::Balances;
use crate::helpers::Timestamp;
use crate::party::PartyId;
use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::str::FromStr;
use thiserror::Error;

const CHANNEL_ID_PREFIX: &str = "TCH";
const CHANNEL_ID_BYTES: usize = 16;

/// The unique identifier for a payment channel.
///
/// The channel ID is derived from a Blake2b-512 hash (domain separator: `"Tally ChannelId v1"`) over the
/// following fields, in order, each prefixed with its length as a little-endian u64:
/// - `party_a`: party A's account identifier (UTF-8)
/// - `party_b`: party B's account identifier (UTF-8)
/// - `balance_a`: A's initial balance in satoshis (u64, little-endian)
/// - `balance_b`: B's initial balance in satoshis (u64, little-endian)
/// - `opened_at`: seconds since the Unix epoch (u64, little-endian)
/// - `nonce`: a random nonce (u64, little-endian)
///
/// The human-readable format is `TCH` followed by the first 16 bytes of the hash encoded as hex (35 characters).
/// Repeated channels between the same pair of parties get distinct IDs through the nonce.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Invalid channel id '{0}'. Expected TCH followed by 32 hex characters")]
pub struct InvalidChannelId(String);

impl ChannelId {
    pub fn derive(party_a: &PartyId, party_b: &PartyId, initial: Balances, opened_at: Timestamp, nonce: u64) -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(b"Tally ChannelId v1");
        for field in [party_a.as_str().as_bytes(), party_b.as_str().as_bytes()] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field);
        }
        for field in [initial.party_a.to_sats(), initial.party_b.to_sats(), opened_at.as_secs(), nonce] {
            hasher.update(8u64.to_le_bytes());
            hasher.update(field.to_le_bytes());
        }
        let hash = hasher.finalize();
        ChannelId(format!("{CHANNEL_ID_PREFIX}{}", hex::encode(&hash[..CHANNEL_ID_BYTES])))
    }

    /// The channel ID as a string, e.g. `TCH4a7024e7fd6f5c6a2d0131d12fd91ecd`. Also used as the file name stem by the
    /// file store.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChannelId {
    type Err = InvalidChannelId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s.strip_prefix(CHANNEL_ID_PREFIX).ok_or_else(|| InvalidChannelId(s.to_string()))?;
        let valid = hex_part.len() == CHANNEL_ID_BYTES * 2 && hex::decode(hex_part).is_ok();
        if !valid {
            return Err(InvalidChannelId(s.to_string()));
        }
        Ok(ChannelId(format!("{CHANNEL_ID_PREFIX}{}", hex_part.to_ascii_lowercase())))
    }
}

impl TryFrom<String> for ChannelId {
    type Error = InvalidChannelId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ChannelId::from_str(&value)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl Debug for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amount::SatoshiAmount;

    fn balances() -> Balances {
        Balances::new(SatoshiAmount::from_sats(100_000), SatoshiAmount::ZERO)
    }

    #[test]
    fn channel_id_format() {
        let id = ChannelId::derive(&"alice".into(), &"bob".into(), balances(), Timestamp::new(1_700_000_000), 42);
        assert!(id.name().starts_with("TCH"));
        assert_eq!(id.name().len(), 35);
        let parsed: ChannelId = id.name().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn id_equality() {
        let alice = PartyId::from("alice");
        let bob = PartyId::from("bob");
        let ts = Timestamp::new(1_700_000_000);
        let id1 = ChannelId::derive(&alice, &bob, balances(), ts, 1);
        let id2 = ChannelId::derive(&alice, &bob, balances(), ts, 1);
        assert_eq!(id1, id2);
        // Different nonce -> different ID
        assert_ne!(id1, ChannelId::derive(&alice, &bob, balances(), ts, 2));
        // Swapped parties -> different ID
        assert_ne!(id1, ChannelId::derive(&bob, &alice, balances(), ts, 1));
        // Length prefixes keep "ab"+"c" apart from "a"+"bc"
        let left = ChannelId::derive(&"ab".into(), &"c".into(), balances(), ts, 1);
        let right = ChannelId::derive(&"a".into(), &"bc".into(), balances(), ts, 1);
        assert_ne!(left, right);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!("XGC00".parse::<ChannelId>().is_err());
        assert!("TCH1234".parse::<ChannelId>().is_err());
        assert!("TCHzz000000000000000000000000000000".parse::<ChannelId>().is_err());
        assert!("TCH00000000000000000000000000000000".parse::<ChannelId>().is_ok());
    }

    #[test]
    fn serialize_deserialize_roundtrip() {
        let id = ChannelId::derive(&"alice".into(), &"bob".into(), balances(), Timestamp::new(5), 7);
        let serialized = ron::to_string(&id).unwrap();
        let deserialized: ChannelId = ron::from_str(&serialized).unwrap();
        assert_eq!(id, deserialized);
        let bad = ron::from_str::<ChannelId>("\"not-an-id\"");
        assert!(bad.is_err());
    }
}
