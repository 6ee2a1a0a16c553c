use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// An opaque account identifier for one of the two parties in a channel.
///
/// Identities arrive pre-authenticated; the engine only ever compares them for channel membership.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        PartyId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyId {
    fn from(value: &str) -> Self {
        PartyId::new(value)
    }
}

impl From<String> for PartyId {
    fn from(value: String) -> Self {
        PartyId(value)
    }
}

impl AsRef<str> for PartyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which end of the channel a party sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelSide {
    A,
    B,
}

impl Display for ChannelSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelSide::A => write!(f, "A"),
            ChannelSide::B => write!(f, "B"),
        }
    }
}

impl ChannelSide {
    pub const fn other(&self) -> Self {
        match self {
            ChannelSide::A => ChannelSide::B,
            ChannelSide::B => ChannelSide::A,
        }
    }

    pub const fn is_a(&self) -> bool {
        matches!(self, ChannelSide::A)
    }

    pub const fn is_b(&self) -> bool {
        matches!(self, ChannelSide::B)
    }
}
