use crate::amount::SatoshiAmount;
use crate::channel_id::ChannelId;
use crate::error::ChannelError;
use crate::events::{ChannelEvent, ChannelEventKind, EventBus};
use crate::history::HistoryStore;
use crate::payment::Payment;
use crate::party::PartyId;
use crate::registry::ChannelRegistry;
use crate::storage::ChannelStore;
use log::*;
use std::sync::Arc;

/// The single entry point for transfers.
///
/// A payment is one commit: the balance change, the durable record and the ledger entry land together under the
/// channel's lock, or none of them do.
#[derive(Clone)]
pub struct PaymentProcessor {
    registry: ChannelRegistry,
    history: HistoryStore,
}

impl PaymentProcessor {
    pub fn new(registry: ChannelRegistry, history: HistoryStore) -> Self {
        PaymentProcessor { registry, history }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub async fn send_payment(
        &self,
        channel_id: &ChannelId,
        from: &PartyId,
        to: &PartyId,
        amount: SatoshiAmount,
        memo: Option<String>,
    ) -> Result<Payment, ChannelError> {
        trace!("Sending {amount} from {from} to {to} on {channel_id}");
        let store: Arc<dyn ChannelStore> = Arc::clone(self.registry.store());
        let events: EventBus = self.registry.events().clone();
        let history = &self.history;
        let (_, payment) = self
            .registry
            .apply_payment(channel_id, from, to, amount, |channel| {
                let payment = Payment::new(
                    channel.id().clone(),
                    from.clone(),
                    to.clone(),
                    amount,
                    memo,
                    channel.sequence(),
                    channel.last_activity_at(),
                );
                history.check_next(&payment)?;
                store.commit_payment(channel, &payment)?;
                history.append(payment.clone())?;
                let kind = ChannelEventKind::PaymentApplied {
                    payment_id: payment.id.clone(),
                    from: payment.from.clone(),
                    amount,
                };
                events.publish(ChannelEvent::new(kind, channel, payment.applied_at));
                Ok(payment)
            })
            .await
            .inspect_err(|e| debug!("Payment on {channel_id} rejected: {e}"))?;
        Ok(payment)
    }
}
