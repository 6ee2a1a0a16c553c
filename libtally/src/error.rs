use crate::amount::SatoshiAmount;
use crate::channel_id::ChannelId;
use crate::party::PartyId;
use crate::settlement::SettlementError;
use crate::state_machine::{LifeCycleError, LifecycleStage};
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid request. {0}")]
    Validation(String),
    #[error("Channel {0} does not exist.")]
    NotFound(ChannelId),
    #[error("{party} is not a party to channel {channel}, or is not allowed to make this request.")]
    UnauthorizedParty { channel: ChannelId, party: PartyId },
    #[error("Invalid amount {amount} for channel {channel}. Payments must be positive.")]
    InvalidAmount { channel: ChannelId, amount: SatoshiAmount },
    #[error("Insufficient balance in channel {channel}: {party} attempted to send {attempted} but has {available}.")]
    InsufficientBalance { channel: ChannelId, party: PartyId, attempted: SatoshiAmount, available: SatoshiAmount },
    #[error("Channel {channel} is {stage} and no longer accepts this request.")]
    ChannelClosed { channel: ChannelId, stage: LifecycleStage },
    #[error("Invalid state transition on channel {channel}. {source}")]
    InvalidStateTransition { channel: ChannelId, source: LifeCycleError },
    #[error("Channel {channel} is busy. Could not acquire its lock within {waited_ms}ms.")]
    ConcurrencyConflict { channel: ChannelId, waited_ms: u64 },
    #[error("Storage error. {0}")]
    Storage(#[from] StorageError),
    #[error("Settlement error. {0}")]
    Settlement(#[from] SettlementError),
    #[error("Internal error. {0}")]
    Internal(String),
}

impl ChannelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ChannelError::Validation(msg.into())
    }

    /// Lifts a state machine refusal into the public error taxonomy.
    pub fn from_lifecycle(channel: &ChannelId, err: LifeCycleError, party: Option<&PartyId>) -> Self {
        match err {
            LifeCycleError::SettlementMismatch { .. } | LifeCycleError::SettlementReferenceRequired { .. } => {
                ChannelError::Validation(err.to_string())
            }
            LifeCycleError::CounterClaimByInitiator => match party {
                Some(party) => ChannelError::UnauthorizedParty { channel: channel.clone(), party: party.clone() },
                None => ChannelError::Validation(err.to_string()),
            },
            other => ChannelError::InvalidStateTransition { channel: channel.clone(), source: other },
        }
    }

    /// A short machine-friendly name for the error category, used in logs and CLI exit reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelError::Validation(_) => "ValidationError",
            ChannelError::NotFound(_) => "NotFoundError",
            ChannelError::UnauthorizedParty { .. } => "UnauthorizedPartyError",
            ChannelError::InvalidAmount { .. } => "InvalidAmountError",
            ChannelError::InsufficientBalance { .. } => "InsufficientBalanceError",
            ChannelError::ChannelClosed { .. } => "ChannelClosedError",
            ChannelError::InvalidStateTransition { .. } => "InvalidStateTransitionError",
            ChannelError::ConcurrencyConflict { .. } => "ConcurrencyConflictError",
            ChannelError::Storage(_) => "StorageError",
            ChannelError::Settlement(_) => "SettlementError",
            ChannelError::Internal(_) => "InternalError",
        }
    }
}
