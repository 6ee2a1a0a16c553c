use crate::amount::SatoshiAmount;
use crate::channel::Channel;
use crate::channel_id::ChannelId;
use crate::closure::ClosureCoordinator;
use crate::clock::{Clock, SystemClock};
use crate::config::{ChannelConfig, SettlementMode};
use crate::error::ChannelError;
use crate::events::{ChannelEvent, EventBus};
use crate::history::HistoryStore;
use crate::monitor::{TimeoutAction, TimeoutMonitor};
use crate::party::PartyId;
use crate::payment::Payment;
use crate::processor::PaymentProcessor;
use crate::registry::ChannelRegistry;
use crate::settlement::{SettlementReference, SettlementService};
use crate::storage::{ChannelStore, FileStore, MemoryStore};
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Wires the engine together from a [`ChannelConfig`] and exposes every channel operation in one place.
pub struct ChannelManager<S> {
    config: ChannelConfig,
    registry: ChannelRegistry,
    history: HistoryStore,
    processor: PaymentProcessor,
    closure: ClosureCoordinator<S>,
    monitor: TimeoutMonitor,
}

impl<S: SettlementService> ChannelManager<S> {
    /// Opens the store named by `config.data_dir` (in memory if there is none) on the system clock.
    ///
    /// `settlement` is only used when `config.settlement` is [`SettlementMode::Manual`].
    pub fn open(config: ChannelConfig, settlement: S) -> Result<Self, ChannelError> {
        let store: Arc<dyn ChannelStore> = match &config.data_dir {
            Some(path) => {
                info!("Opening channel store at {}", path.display());
                Arc::new(FileStore::new(path.clone())?)
            }
            None => {
                info!("No data directory configured. Channels will be kept in memory");
                Arc::new(MemoryStore::new())
            }
        };
        Self::with_parts(config, store, Arc::new(SystemClock), settlement)
    }

    pub fn with_parts(
        config: ChannelConfig,
        store: Arc<dyn ChannelStore>,
        clock: Arc<dyn Clock>,
        settlement: S,
    ) -> Result<Self, ChannelError> {
        config.validate()?;
        let channels = store.load_channels()?;
        let history = HistoryStore::load(store.as_ref(), channels.iter().map(|c| c.id()))?;
        let registry = ChannelRegistry::with_channels(channels, store, EventBus::default(), clock, config.lock_timeout());
        let policy = config.timeout_policy();
        let settlement = match config.settlement {
            SettlementMode::Manual => Some(settlement),
            SettlementMode::None => None,
        };
        let processor = PaymentProcessor::new(registry.clone(), history.clone());
        let closure = ClosureCoordinator::new(registry.clone(), settlement, policy);
        let monitor = TimeoutMonitor::new(registry.clone(), policy);
        Ok(ChannelManager { config, registry, history, processor, closure, monitor })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.registry.events().subscribe()
    }

    /// Opens a channel. Without `timeout_blocks`, the configured default is used.
    pub async fn open_channel(
        &self,
        party_a: PartyId,
        party_b: PartyId,
        balance_a: SatoshiAmount,
        balance_b: SatoshiAmount,
        timeout_blocks: Option<u64>,
    ) -> Result<ChannelId, ChannelError> {
        let timeout_blocks = timeout_blocks.unwrap_or(self.config.default_timeout_blocks);
        self.registry.open_channel(party_a, party_b, balance_a, balance_b, timeout_blocks).await
    }

    pub async fn get_channel(&self, id: &ChannelId) -> Result<Channel, ChannelError> {
        self.registry.get_channel(id).await
    }

    pub async fn list_channels(&self) -> Vec<Channel> {
        self.registry.list_channels().await
    }

    pub async fn list_channels_for_party(&self, party: &PartyId) -> Vec<Channel> {
        self.registry.list_channels_for_party(party).await
    }

    pub async fn send_payment(
        &self,
        id: &ChannelId,
        from: &PartyId,
        to: &PartyId,
        amount: SatoshiAmount,
        memo: Option<String>,
    ) -> Result<Payment, ChannelError> {
        self.processor.send_payment(id, from, to, amount, memo).await
    }

    /// The payments applied to a channel, oldest first.
    pub async fn get_history(&self, id: &ChannelId) -> Result<Vec<Payment>, ChannelError> {
        // Fails for unknown channels.
        self.registry.get_channel(id).await?;
        self.history.get_history(id)
    }

    pub async fn close_channel(&self, id: &ChannelId, party: &PartyId) -> Result<Channel, ChannelError> {
        self.closure.close_channel(id, party).await
    }

    pub async fn confirm_settlement(
        &self,
        id: &ChannelId,
        reference: Option<SettlementReference>,
    ) -> Result<Channel, ChannelError> {
        self.closure.confirm_settlement(id, reference).await
    }

    pub async fn force_close(&self, id: &ChannelId, party: &PartyId, reason: String) -> Result<Channel, ChannelError> {
        self.closure.force_close(id, party, reason).await
    }

    pub async fn counter_claim(&self, id: &ChannelId, party: &PartyId, note: String) -> Result<Channel, ChannelError> {
        self.closure.counter_claim(id, party, note).await
    }

    pub async fn resolve_dispute(&self, id: &ChannelId, note: String) -> Result<Channel, ChannelError> {
        self.closure.resolve_dispute(id, note).await
    }

    pub async fn check_timeouts(&self) -> Vec<TimeoutAction> {
        self.monitor.check_timeouts().await
    }

    /// Starts the timeout monitor on its own task.
    pub fn spawn_monitor(&self, interval: Duration) -> JoinHandle<()> {
        self.monitor.clone().spawn(interval)
    }
}
