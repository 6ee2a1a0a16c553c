use crate::helpers::Timestamp;
use crate::state_machine::closed_channel::ClosedChannelState;
use crate::state_machine::closing_channel::ClosingChannelState;
use crate::state_machine::disputing_channel::DisputingChannelState;
use crate::state_machine::error::LifeCycleError;
use crate::state_machine::events::LifeCycleEvent;
use log::*;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A lightweight type indicating which phase of the lifecycle we're in. Generally used for reporting purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleStage {
    /// The channel is open and accepts payments.
    Active,
    /// A cooperative close is waiting on the settlement layer.
    Closing,
    /// A unilateral close is in its dispute window.
    Disputed,
    /// The channel is closed and cannot be used anymore.
    Closed,
}

impl Display for LifecycleStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStage::Active => write!(f, "Active"),
            LifecycleStage::Closing => write!(f, "Closing"),
            LifecycleStage::Disputed => write!(f, "Disputed"),
            LifecycleStage::Closed => write!(f, "Closed"),
        }
    }
}

/// The lifecycle state of a channel, along with the data each state carries.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelStatus {
    #[default]
    Active,
    Closing(ClosingChannelState),
    Disputed(DisputingChannelState),
    Closed(ClosedChannelState),
}

impl ChannelStatus {
    pub fn stage(&self) -> LifecycleStage {
        match self {
            ChannelStatus::Active => LifecycleStage::Active,
            ChannelStatus::Closing(_) => LifecycleStage::Closing,
            ChannelStatus::Disputed(_) => LifecycleStage::Disputed,
            ChannelStatus::Closed(_) => LifecycleStage::Closed,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ChannelStatus::Active)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelStatus::Closed(_))
    }

    pub fn as_closing(&self) -> Option<&ClosingChannelState> {
        match self {
            ChannelStatus::Closing(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_disputed(&self) -> Option<&DisputingChannelState> {
        match self {
            ChannelStatus::Disputed(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_closed(&self) -> Option<&ClosedChannelState> {
        match self {
            ChannelStatus::Closed(state) => Some(state),
            _ => None,
        }
    }

    pub fn closed_at(&self) -> Option<Timestamp> {
        self.as_closed().map(|c| c.closed_at())
    }

    /// The single transition table for the channel lifecycle.
    ///
    /// On failure the original status is handed back untouched along with the reason the event was refused.
    #[allow(clippy::result_large_err)]
    pub fn next(self, event: LifeCycleEvent) -> Result<ChannelStatus, (ChannelStatus, LifeCycleError)> {
        let from = self.stage();
        trace!("⚡️ Lifecycle: {from} + {event}");
        match (self, event) {
            (ChannelStatus::Active, LifeCycleEvent::StartClose(request)) => {
                Ok(ChannelStatus::Closing(ClosingChannelState::new(*request)))
            }
            (ChannelStatus::Active, LifeCycleEvent::ForceClose(info)) => {
                Ok(ChannelStatus::Disputed(DisputingChannelState::new(*info)))
            }
            (ChannelStatus::Closing(mut state), LifeCycleEvent::SettlementSubmitted(reference)) => {
                state.record_submission(*reference);
                Ok(ChannelStatus::Closing(state))
            }
            (ChannelStatus::Closing(mut state), LifeCycleEvent::SettlementFailed(reason)) => {
                state.record_failure(reason);
                Ok(ChannelStatus::Closing(state))
            }
            (ChannelStatus::Closing(state), LifeCycleEvent::SettlementFinalized { reference, at }) => state
                .finalize(reference, at)
                .map(ChannelStatus::Closed)
                .map_err(|(state, err)| (ChannelStatus::Closing(state), err)),
            (ChannelStatus::Disputed(mut state), LifeCycleEvent::CounterClaim(claim)) => match state.contest(*claim) {
                Ok(()) => Ok(ChannelStatus::Disputed(state)),
                Err(err) => Err((ChannelStatus::Disputed(state), err)),
            },
            (ChannelStatus::Disputed(state), LifeCycleEvent::DisputeWindowElapsed(now)) => state
                .finalize_uncontested(now)
                .map(ChannelStatus::Closed)
                .map_err(|(state, err)| (ChannelStatus::Disputed(state), err)),
            (ChannelStatus::Disputed(state), LifeCycleEvent::DisputeResolved(resolution)) => {
                Ok(ChannelStatus::Closed(state.resolve(*resolution)))
            }
            (status, event) => {
                debug!("⚡️ Rejected lifecycle event {event} in the {from} state");
                Err((status, LifeCycleError::invalid_transition(from, event.to_string())))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::party::PartyId;
    use crate::settlement::SettlementReference;
    use crate::state_machine::closed_channel::ChannelClosedReason;
    use crate::state_machine::closing_channel::CloseRequest;
    use crate::state_machine::disputing_channel::{CounterClaim, DisputeResolution, ForceCloseInfo};

    fn start_close() -> LifeCycleEvent {
        LifeCycleEvent::StartClose(Box::new(CloseRequest {
            requested_by: PartyId::from("alice"),
            requested_at: Timestamp::new(100),
        }))
    }

    fn force_close() -> LifeCycleEvent {
        LifeCycleEvent::ForceClose(Box::new(ForceCloseInfo {
            initiated_by: PartyId::from("alice"),
            reason: "unresponsive".into(),
            started_at: Timestamp::new(100),
            window_ends: Timestamp::new(700),
        }))
    }

    fn finalized(reference: Option<&str>) -> LifeCycleEvent {
        LifeCycleEvent::SettlementFinalized { reference: reference.map(SettlementReference::new), at: Timestamp::new(200) }
    }

    #[test]
    fn cooperative_close_path() {
        env_logger::try_init().ok();
        let status = ChannelStatus::Active.next(start_close()).expect("Active -> Closing");
        assert_eq!(status.stage(), LifecycleStage::Closing);
        let status = status
            .next(LifeCycleEvent::SettlementSubmitted(Box::new(SettlementReference::new("ref-1"))))
            .expect("recording the submission");
        assert_eq!(status.as_closing().and_then(|c| c.settlement()).map(|r| r.as_str()), Some("ref-1"));
        let Err((status, err)) = status.next(finalized(Some("ref-2"))) else {
            panic!("mismatched acknowledgment must be refused");
        };
        assert!(matches!(err, LifeCycleError::SettlementMismatch { .. }));
        assert_eq!(status.stage(), LifecycleStage::Closing);
        let Err((status, err)) = status.next(finalized(None)) else {
            panic!("an acknowledgment without the reference must be refused");
        };
        assert!(matches!(err, LifeCycleError::SettlementReferenceRequired { .. }));
        let status = status.next(finalized(Some("ref-1"))).expect("Closing -> Closed");
        let closed = status.as_closed().expect("closed");
        assert_eq!(closed.reason(), &ChannelClosedReason::Cooperative);
        assert_eq!(status.closed_at(), Some(Timestamp::new(200)));
    }

    #[test]
    fn settlement_failure_keeps_closing() {
        let status = ChannelStatus::Active.next(start_close()).unwrap();
        let status = status.next(LifeCycleEvent::SettlementFailed("offline".into())).unwrap();
        let closing = status.as_closing().unwrap();
        assert!(closing.awaiting_submission());
        assert_eq!(closing.last_settlement_error(), Some("offline"));
        // Nothing was recorded, so an acknowledgment without a reference closes the channel.
        let status = status.next(finalized(None)).unwrap();
        assert!(status.is_closed());
    }

    #[test]
    fn dispute_paths() {
        let status = ChannelStatus::Active.next(force_close()).expect("Active -> Disputed");
        assert_eq!(status.stage(), LifecycleStage::Disputed);
        let Err((status, err)) = status.next(LifeCycleEvent::DisputeWindowElapsed(Timestamp::new(699))) else {
            panic!("window has not elapsed");
        };
        assert!(matches!(err, LifeCycleError::DisputeWindowOpen { .. }));
        let status = status
            .next(LifeCycleEvent::CounterClaim(Box::new(CounterClaim {
                claimant: PartyId::from("bob"),
                note: "I have a newer state".into(),
                at: Timestamp::new(300),
            })))
            .expect("counter-claim by the counterparty");
        let Err((status, err)) = status.next(LifeCycleEvent::DisputeWindowElapsed(Timestamp::new(800))) else {
            panic!("a contested dispute is not finalized by the window");
        };
        assert_eq!(err, LifeCycleError::DisputeContested);
        let status = status
            .next(LifeCycleEvent::DisputeResolved(Box::new(DisputeResolution {
                resolved_at: Timestamp::new(900),
                note: "arbiter".into(),
            })))
            .expect("explicit resolution");
        assert_eq!(status.as_closed().unwrap().reason(), &ChannelClosedReason::DisputeResolved("arbiter".into()));
    }

    #[test]
    fn closed_is_terminal() {
        let status = ChannelStatus::Active.next(force_close()).unwrap();
        let status = status.next(LifeCycleEvent::DisputeWindowElapsed(Timestamp::new(700))).unwrap();
        assert!(status.is_closed());
        for event in [start_close(), force_close(), finalized(None), LifeCycleEvent::DisputeWindowElapsed(Timestamp::new(900))] {
            let Err((same, err)) = status.clone().next(event) else {
                panic!("Closed must not transition");
            };
            assert_eq!(same, status);
            assert!(matches!(err, LifeCycleError::InvalidStateTransition { from: LifecycleStage::Closed, .. }));
        }
    }

    #[test]
    fn active_rejects_closing_events() {
        let Err((status, err)) = ChannelStatus::Active.next(finalized(None)) else {
            panic!("Active cannot be finalized");
        };
        assert_eq!(status, ChannelStatus::Active);
        assert_eq!(err.to_string(), "A channel in the Active state cannot handle OnSettlementFinalized");
    }
}
