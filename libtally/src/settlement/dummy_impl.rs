use crate::settlement::{SettlementError, SettlementIntent, SettlementReference, SettlementService};
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// An in-process settlement layer. It accepts every intent, remembers it, and hands back a reference built from the
/// channel id and the settled sequence number. Finalization is left to the caller, who acknowledges it through the
/// closure coordinator.
#[derive(Debug, Clone, Default)]
pub struct DummySettlement {
    submitted: Arc<Mutex<Vec<SettlementIntent>>>,
    offline: Arc<AtomicBool>,
}

impl DummySettlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, every submission fails with [`SettlementError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The intents accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<SettlementIntent> {
        match self.submitted.lock() {
            Ok(intents) => intents.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SettlementService for DummySettlement {
    async fn submit(&self, intent: SettlementIntent) -> Result<SettlementReference, SettlementError> {
        if self.offline.load(Ordering::SeqCst) {
            warn!("Dummy settlement is offline. Rejecting intent for {}", intent.channel_id);
            return Err(SettlementError::Unavailable("dummy settlement is offline".into()));
        }
        let reference = SettlementReference::new(format!("dummy-{}-{}", intent.channel_id.name(), intent.sequence));
        info!("Dummy settlement accepted {} as {reference}", intent.channel_id);
        match self.submitted.lock() {
            Ok(mut intents) => intents.push(intent),
            Err(poisoned) => poisoned.into_inner().push(intent),
        }
        Ok(reference)
    }
}
