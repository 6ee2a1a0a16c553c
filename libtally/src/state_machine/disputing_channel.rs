use crate::helpers::Timestamp;
use crate::party::PartyId;
use crate::state_machine::closed_channel::{ChannelClosedReason, ClosedChannelState};
use crate::state_machine::error::LifeCycleError;
use serde::{Deserialize, Serialize};

/// The data recorded when a party starts a unilateral close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceCloseInfo {
    pub initiated_by: PartyId,
    pub reason: String,
    pub started_at: Timestamp,
    pub window_ends: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterClaim {
    pub claimant: PartyId,
    pub note: String,
    pub at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolution {
    pub resolved_at: Timestamp,
    pub note: String,
}

/// A force close is under way. The channel closes at the last agreed balances once the window passes
/// uncontested, or when an explicit resolution arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputingChannelState {
    pub(crate) initiated_by: PartyId,
    pub(crate) reason: String,
    pub(crate) started_at: Timestamp,
    pub(crate) window_ends: Timestamp,
    pub(crate) counter_claim: Option<CounterClaim>,
}

impl DisputingChannelState {
    pub fn new(info: ForceCloseInfo) -> Self {
        DisputingChannelState {
            initiated_by: info.initiated_by,
            reason: info.reason,
            started_at: info.started_at,
            window_ends: info.window_ends,
            counter_claim: None,
        }
    }

    pub fn initiated_by(&self) -> &PartyId {
        &self.initiated_by
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn window_ends(&self) -> Timestamp {
        self.window_ends
    }

    pub fn counter_claim(&self) -> Option<&CounterClaim> {
        self.counter_claim.as_ref()
    }

    pub fn is_contested(&self) -> bool {
        self.counter_claim.is_some()
    }

    /// True once `now` is at or past the end of the dispute window.
    pub fn window_elapsed(&self, now: Timestamp) -> bool {
        now >= self.window_ends
    }

    pub(crate) fn contest(&mut self, claim: CounterClaim) -> Result<(), LifeCycleError> {
        if claim.claimant == self.initiated_by {
            return Err(LifeCycleError::CounterClaimByInitiator);
        }
        if self.counter_claim.is_some() {
            return Err(LifeCycleError::AlreadyContested);
        }
        if self.window_elapsed(claim.at) {
            return Err(LifeCycleError::DisputeWindowClosed { window_ends: self.window_ends });
        }
        self.counter_claim = Some(claim);
        Ok(())
    }

    /// Closes an uncontested dispute whose window has passed.
    #[allow(clippy::result_large_err)]
    pub fn finalize_uncontested(self, now: Timestamp) -> Result<ClosedChannelState, (Self, LifeCycleError)> {
        if self.is_contested() {
            return Err((self, LifeCycleError::DisputeContested));
        }
        if !self.window_elapsed(now) {
            let window_ends = self.window_ends;
            return Err((self, LifeCycleError::DisputeWindowOpen { window_ends }));
        }
        Ok(ClosedChannelState::new(ChannelClosedReason::DisputeWindowElapsed, None, now))
    }

    pub fn resolve(self, resolution: DisputeResolution) -> ClosedChannelState {
        ClosedChannelState::new(ChannelClosedReason::DisputeResolved(resolution.note), None, resolution.resolved_at)
    }
}
