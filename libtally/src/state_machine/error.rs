use crate::helpers::Timestamp;
use crate::settlement::SettlementReference;
use crate::state_machine::lifecycle::LifecycleStage;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifeCycleError {
    #[error("A channel in the {from} state cannot handle {event}")]
    InvalidStateTransition { from: LifecycleStage, event: String },
    #[error("The dispute window is still open until {window_ends}")]
    DisputeWindowOpen { window_ends: Timestamp },
    #[error("The dispute window closed at {window_ends}")]
    DisputeWindowClosed { window_ends: Timestamp },
    #[error("The dispute has been contested and must be resolved explicitly")]
    DisputeContested,
    #[error("The dispute has already been contested")]
    AlreadyContested,
    #[error("The party that started the force close cannot counter-claim against it")]
    CounterClaimByInitiator,
    #[error("Settlement acknowledgment {received} does not match the submitted settlement {expected}")]
    SettlementMismatch { expected: SettlementReference, received: SettlementReference },
    #[error("Settlement {expected} was submitted for this channel. Its acknowledgment must name it")]
    SettlementReferenceRequired { expected: SettlementReference },
}

impl LifeCycleError {
    pub fn invalid_transition(from: LifecycleStage, event: impl Into<String>) -> Self {
        LifeCycleError::InvalidStateTransition { from, event: event.into() }
    }
}
