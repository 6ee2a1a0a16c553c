use crate::channel::Channel;
use crate::channel_id::ChannelId;
use crate::config::TimeoutPolicy;
use crate::error::ChannelError;
use crate::events::ChannelEventKind;
use crate::party::PartyId;
use crate::registry::ChannelRegistry;
use crate::settlement::{SettlementIntent, SettlementReference, SettlementService};
use crate::state_machine::{
    ChannelStatus, CloseRequest, CounterClaim, DisputeResolution, ForceCloseInfo, LifeCycleEvent,
};
use log::*;
use std::sync::Arc;

/// Drives channels to Closed, either cooperatively through the settlement layer or unilaterally through a
/// dispute window.
///
/// Without a settlement service, cooperative closes complete on the spot.
pub struct ClosureCoordinator<S> {
    registry: ChannelRegistry,
    settlement: Option<Arc<S>>,
    policy: TimeoutPolicy,
}

impl<S> Clone for ClosureCoordinator<S> {
    fn clone(&self) -> Self {
        ClosureCoordinator {
            registry: self.registry.clone(),
            settlement: self.settlement.clone(),
            policy: self.policy,
        }
    }
}

fn require_party(channel: &Channel, party: &PartyId) -> Result<(), ChannelError> {
    if channel.is_party(party) {
        Ok(())
    } else {
        Err(ChannelError::UnauthorizedParty { channel: channel.id().clone(), party: party.clone() })
    }
}

fn closed_event(channel: &Channel) -> Vec<ChannelEventKind> {
    channel.status().as_closed().map(|c| ChannelEventKind::Closed(c.reason().clone())).into_iter().collect()
}

impl<S: SettlementService> ClosureCoordinator<S> {
    pub fn new(registry: ChannelRegistry, settlement: Option<S>, policy: TimeoutPolicy) -> Self {
        ClosureCoordinator { registry, settlement: settlement.map(Arc::new), policy }
    }

    pub fn has_settlement(&self) -> bool {
        self.settlement.is_some()
    }

    /// Starts a cooperative close. The final balances are the current ones.
    ///
    /// With a settlement service, the closing intent is submitted after the channel lock is released and the
    /// channel stays Closing until [`confirm_settlement`](Self::confirm_settlement). Calling this again on a
    /// Closing channel retries a submission that failed and otherwise changes nothing.
    pub async fn close_channel(&self, id: &ChannelId, party: &PartyId) -> Result<Channel, ChannelError> {
        let now = self.registry.now();
        let settle = self.has_settlement();
        let (channel, submit) = self
            .registry
            .update_channel(id, |channel| {
                require_party(channel, party)?;
                match channel.status() {
                    ChannelStatus::Active => {
                        let request = CloseRequest { requested_by: party.clone(), requested_at: now };
                        channel.transition(LifeCycleEvent::StartClose(Box::new(request)), Some(party))?;
                        let mut events = vec![ChannelEventKind::CloseRequested { by: party.clone() }];
                        if !settle {
                            let finalize = LifeCycleEvent::SettlementFinalized { reference: None, at: now };
                            channel.transition(finalize, Some(party))?;
                            events.extend(closed_event(channel));
                        }
                        Ok((settle, events))
                    }
                    ChannelStatus::Closing(closing) if closing.awaiting_submission() => {
                        if settle {
                            debug!("⚡️ Channel {id} is closing without a settlement reference. Resubmitting");
                            return Ok((true, Vec::new()));
                        }
                        let finalize = LifeCycleEvent::SettlementFinalized { reference: None, at: now };
                        channel.transition(finalize, Some(party))?;
                        Ok((false, closed_event(channel)))
                    }
                    ChannelStatus::Closing(_) => Ok((false, Vec::new())),
                    _ => Err(ChannelError::ChannelClosed { channel: id.clone(), stage: channel.stage() }),
                }
            })
            .await?;
        if submit {
            self.submit_settlement(id, channel).await
        } else {
            Ok(channel)
        }
    }

    async fn submit_settlement(&self, id: &ChannelId, channel: Channel) -> Result<Channel, ChannelError> {
        let Some(settlement) = &self.settlement else {
            return Ok(channel);
        };
        let intent = SettlementIntent::for_channel(&channel);
        info!("Submitting settlement for {id}: {} at sequence {}", intent.final_balances, intent.sequence);
        match settlement.submit(intent).await {
            Ok(reference) => {
                let (channel, _) = self
                    .registry
                    .update_channel(id, |channel| match channel.status().as_closing() {
                        Some(closing) if closing.awaiting_submission() => {
                            let event = LifeCycleEvent::SettlementSubmitted(Box::new(reference.clone()));
                            channel.transition(event, None)?;
                            Ok(((), vec![ChannelEventKind::SettlementSubmitted(reference)]))
                        }
                        _ => {
                            warn!("Channel {id} is no longer waiting for a settlement. Ignoring {reference}");
                            Ok(((), Vec::new()))
                        }
                    })
                    .await?;
                Ok(channel)
            }
            Err(err) => {
                warn!("Settlement submission for {id} failed: {err}");
                let reason = err.to_string();
                self.registry
                    .update_channel(id, |channel| {
                        if channel.status().as_closing().is_none() {
                            return Ok(((), Vec::new()));
                        }
                        channel.transition(LifeCycleEvent::SettlementFailed(reason.clone()), None)?;
                        Ok(((), vec![ChannelEventKind::SettlementFailed(reason)]))
                    })
                    .await?;
                Err(ChannelError::Settlement(err))
            }
        }
    }

    /// The finalize acknowledgment from the settlement layer. Moves a Closing channel to Closed.
    ///
    /// If a settlement was submitted, `reference` must name it. Repeating the acknowledgment for a channel that
    /// this settlement already closed is a no-op.
    pub async fn confirm_settlement(
        &self,
        id: &ChannelId,
        reference: Option<SettlementReference>,
    ) -> Result<Channel, ChannelError> {
        let now = self.registry.now();
        let (channel, _) = self
            .registry
            .update_channel(id, |channel| {
                if let Some(closed) = channel.status().as_closed() {
                    if reference.is_some() && closed.settlement() == reference.as_ref() {
                        return Ok(((), Vec::new()));
                    }
                }
                channel.transition(LifeCycleEvent::SettlementFinalized { reference, at: now }, None)?;
                Ok(((), closed_event(channel)))
            })
            .await?;
        Ok(channel)
    }

    /// Starts a unilateral close. No agreement from the counterparty is needed. The channel closes at its current
    /// balances once the dispute window passes without a counter-claim.
    pub async fn force_close(&self, id: &ChannelId, party: &PartyId, reason: String) -> Result<Channel, ChannelError> {
        let now = self.registry.now();
        let policy = self.policy;
        let (channel, _) = self
            .registry
            .update_channel(id, |channel| {
                require_party(channel, party)?;
                match channel.status() {
                    ChannelStatus::Active => {
                        let window_ends = now.after(policy.dispute_window(channel.timeout_blocks()));
                        let info =
                            ForceCloseInfo { initiated_by: party.clone(), reason: reason.clone(), started_at: now, window_ends };
                        channel.transition(LifeCycleEvent::ForceClose(Box::new(info)), Some(party))?;
                        info!("⚡️ Channel {id} force closed by {party}. Dispute window ends {window_ends}");
                        Ok(((), vec![ChannelEventKind::ForceClosed { by: party.clone(), reason }]))
                    }
                    ChannelStatus::Disputed(_) => Ok(((), Vec::new())),
                    _ => Err(ChannelError::ChannelClosed { channel: id.clone(), stage: channel.stage() }),
                }
            })
            .await?;
        Ok(channel)
    }

    /// The counterparty contests a force close while its window is open. A contested dispute needs
    /// [`resolve_dispute`](Self::resolve_dispute) to close.
    pub async fn counter_claim(&self, id: &ChannelId, party: &PartyId, note: String) -> Result<Channel, ChannelError> {
        let now = self.registry.now();
        let (channel, _) = self
            .registry
            .update_channel(id, |channel| {
                require_party(channel, party)?;
                let claim = CounterClaim { claimant: party.clone(), note, at: now };
                channel.transition(LifeCycleEvent::CounterClaim(Box::new(claim)), Some(party))?;
                Ok(((), vec![ChannelEventKind::CounterClaimed { by: party.clone() }]))
            })
            .await?;
        Ok(channel)
    }

    /// An explicit resolution signal. Closes a Disputed channel at its last agreed balances.
    pub async fn resolve_dispute(&self, id: &ChannelId, note: String) -> Result<Channel, ChannelError> {
        let now = self.registry.now();
        let (channel, _) = self
            .registry
            .update_channel(id, |channel| {
                let resolution = DisputeResolution { resolved_at: now, note };
                channel.transition(LifeCycleEvent::DisputeResolved(Box::new(resolution)), None)?;
                Ok(((), closed_event(channel)))
            })
            .await?;
        Ok(channel)
    }
}

#[cfg(all(test, feature = "dummy_settlement"))]
mod test {
    use super::*;
    use crate::amount::SatoshiAmount;
    use crate::clock::ManualClock;
    use crate::events::EventBus;
    use crate::helpers::Timestamp;
    use crate::settlement::dummy_impl::DummySettlement;
    use crate::state_machine::{ChannelClosedReason, LifecycleStage};
    use crate::storage::MemoryStore;
    use std::time::Duration;

    async fn setup(settlement: Option<DummySettlement>) -> (ClosureCoordinator<DummySettlement>, ChannelId) {
        let clock = ManualClock::new(Timestamp::new(10_000));
        let store = Arc::new(MemoryStore::new());
        let registry = ChannelRegistry::new(store, EventBus::default(), Arc::new(clock), Duration::from_secs(5));
        let id = registry
            .open_channel("alice".into(), "bob".into(), SatoshiAmount::from_sats(5_000), SatoshiAmount::ZERO, 6)
            .await
            .unwrap();
        let policy = TimeoutPolicy { block_interval: Duration::from_secs(100), ..Default::default() };
        (ClosureCoordinator::new(registry, settlement, policy), id)
    }

    #[tokio::test]
    async fn close_without_settlement_is_immediate() {
        let (coordinator, id) = setup(None).await;
        let channel = coordinator.close_channel(&id, &"bob".into()).await.unwrap();
        assert_eq!(channel.stage(), LifecycleStage::Closed);
        assert_eq!(channel.closed_at(), Some(Timestamp::new(10_000)));
        let again = coordinator.close_channel(&id, &"alice".into()).await.unwrap_err();
        assert!(matches!(again, ChannelError::ChannelClosed { stage: LifecycleStage::Closed, .. }));
    }

    #[tokio::test]
    async fn close_with_settlement_waits_for_acknowledgment() {
        env_logger::try_init().ok();
        let settlement = DummySettlement::new();
        let (coordinator, id) = setup(Some(settlement.clone())).await;
        let channel = coordinator.close_channel(&id, &"alice".into()).await.unwrap();
        assert_eq!(channel.stage(), LifecycleStage::Closing);
        let reference = channel.status().as_closing().and_then(|c| c.settlement()).cloned().expect("reference");
        let intents = settlement.submitted();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].final_balances, channel.balances());
        // Re-issuing the close is a no-op once the settlement is recorded.
        let again = coordinator.close_channel(&id, &"bob".into()).await.unwrap();
        assert_eq!(again, channel);
        assert_eq!(settlement.submitted().len(), 1);

        let wrong = coordinator.confirm_settlement(&id, Some(SettlementReference::new("other"))).await.unwrap_err();
        assert!(matches!(wrong, ChannelError::Validation(_)));
        let closed = coordinator.confirm_settlement(&id, Some(reference.clone())).await.unwrap();
        assert_eq!(closed.status().as_closed().and_then(|c| c.settlement()), Some(&reference));
        let repeat = coordinator.confirm_settlement(&id, Some(reference)).await.unwrap();
        assert_eq!(repeat, closed);
    }

    #[tokio::test]
    async fn failed_submission_is_retried() {
        let settlement = DummySettlement::new();
        settlement.set_offline(true);
        let (coordinator, id) = setup(Some(settlement.clone())).await;
        let err = coordinator.close_channel(&id, &"alice".into()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Settlement(_)));
        let channel = coordinator.registry.get_channel(&id).await.unwrap();
        let closing = channel.status().as_closing().expect("still closing");
        assert!(closing.last_settlement_error().is_some());
        settlement.set_offline(false);
        let channel = coordinator.close_channel(&id, &"alice".into()).await.unwrap();
        let closing = channel.status().as_closing().expect("still closing");
        assert!(closing.settlement().is_some());
        assert_eq!(closing.last_settlement_error(), None);
    }

    #[tokio::test]
    async fn force_close_rules() {
        let (coordinator, id) = setup(None).await;
        let stranger = coordinator.force_close(&id, &"mallory".into(), "no".into()).await.unwrap_err();
        assert!(matches!(stranger, ChannelError::UnauthorizedParty { .. }));
        let channel = coordinator.force_close(&id, &"alice".into(), "bob vanished".into()).await.unwrap();
        let dispute = channel.status().as_disputed().expect("disputed");
        // 6 blocks of 100 seconds.
        assert_eq!(dispute.window_ends(), Timestamp::new(10_600));
        let again = coordinator.force_close(&id, &"bob".into(), "me too".into()).await.unwrap();
        assert_eq!(again, channel);
        let close = coordinator.close_channel(&id, &"alice".into()).await.unwrap_err();
        assert!(matches!(close, ChannelError::ChannelClosed { stage: LifecycleStage::Disputed, .. }));

        let own = coordinator.counter_claim(&id, &"alice".into(), "".into()).await.unwrap_err();
        assert!(matches!(own, ChannelError::UnauthorizedParty { .. }));
        coordinator.counter_claim(&id, &"bob".into(), "I was offline".into()).await.unwrap();
        let twice = coordinator.counter_claim(&id, &"bob".into(), "".into()).await.unwrap_err();
        assert!(matches!(twice, ChannelError::InvalidStateTransition { .. }));
        let closed = coordinator.resolve_dispute(&id, "settled by arbiter".into()).await.unwrap();
        let reason = closed.status().as_closed().unwrap().reason().clone();
        assert_eq!(reason, ChannelClosedReason::DisputeResolved("settled by arbiter".into()));
        assert_eq!(closed.balances(), channel.balances());
    }

    #[tokio::test]
    async fn resolve_requires_a_dispute() {
        let (coordinator, id) = setup(None).await;
        let err = coordinator.resolve_dispute(&id, "".into()).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidStateTransition { .. }));
    }
}
