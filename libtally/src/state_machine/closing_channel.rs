use crate::helpers::Timestamp;
use crate::party::PartyId;
use crate::settlement::SettlementReference;
use crate::state_machine::closed_channel::{ChannelClosedReason, ClosedChannelState};
use crate::state_machine::error::LifeCycleError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub requested_by: PartyId,
    pub requested_at: Timestamp,
}

/// A cooperative close is under way. Balances are frozen at their values when the close was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingChannelState {
    pub(crate) requested_by: PartyId,
    pub(crate) requested_at: Timestamp,
    pub(crate) settlement: Option<SettlementReference>,
    pub(crate) last_settlement_error: Option<String>,
}

impl ClosingChannelState {
    pub fn new(request: CloseRequest) -> Self {
        ClosingChannelState {
            requested_by: request.requested_by,
            requested_at: request.requested_at,
            settlement: None,
            last_settlement_error: None,
        }
    }

    pub fn requested_by(&self) -> &PartyId {
        &self.requested_by
    }

    pub fn requested_at(&self) -> Timestamp {
        self.requested_at
    }

    pub fn settlement(&self) -> Option<&SettlementReference> {
        self.settlement.as_ref()
    }

    pub fn last_settlement_error(&self) -> Option<&str> {
        self.last_settlement_error.as_deref()
    }

    /// True until the settlement layer has accepted the closing intent.
    pub fn awaiting_submission(&self) -> bool {
        self.settlement.is_none()
    }

    pub(crate) fn record_submission(&mut self, reference: SettlementReference) {
        if let Some(prev) = self.settlement.replace(reference) {
            log::warn!("Overwriting existing settlement reference {prev} on closing channel");
        }
        self.last_settlement_error = None;
    }

    pub(crate) fn record_failure(&mut self, reason: String) {
        self.last_settlement_error = Some(reason);
    }

    #[allow(clippy::result_large_err)]
    pub fn finalize(
        self,
        reference: Option<SettlementReference>,
        at: Timestamp,
    ) -> Result<ClosedChannelState, (Self, LifeCycleError)> {
        let settlement = match (self.settlement.clone(), reference) {
            (Some(expected), Some(received)) if expected != received => {
                return Err((self, LifeCycleError::SettlementMismatch { expected, received }));
            }
            (Some(expected), None) => {
                return Err((self, LifeCycleError::SettlementReferenceRequired { expected }));
            }
            (_, received) => received,
        };
        Ok(ClosedChannelState::new(ChannelClosedReason::Cooperative, settlement, at))
    }
}
