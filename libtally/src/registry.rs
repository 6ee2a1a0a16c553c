use crate::amount::SatoshiAmount;
use crate::balance::Balances;
use crate::channel::Channel;
use crate::channel_id::ChannelId;
use crate::clock::Clock;
use crate::error::ChannelError;
use crate::events::{ChannelEvent, ChannelEventKind, EventBus};
use crate::helpers::Timestamp;
use crate::party::PartyId;
use crate::state_machine::LifeCycleEvent;
use crate::storage::{ChannelStore, StorageError};
use log::*;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

/// Owns every channel record and is the only thing that changes them.
///
/// Channels live in an arena keyed by id, each behind its own lock. The outer map lock is only held long enough
/// to look up or insert an entry, so requests on different channels never wait on each other.
#[derive(Clone)]
pub struct ChannelRegistry {
    channels: Arc<RwLock<HashMap<ChannelId, Arc<RwLock<Channel>>>>>,
    store: Arc<dyn ChannelStore>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
    next_index: Arc<AtomicU64>,
}

impl ChannelRegistry {
    pub fn new(store: Arc<dyn ChannelStore>, events: EventBus, clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        ChannelRegistry {
            channels: Arc::new(RwLock::new(HashMap::new())),
            store,
            events,
            clock,
            lock_timeout,
            next_index: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Rebuilds the registry from everything in `store`.
    pub fn load(
        store: Arc<dyn ChannelStore>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        lock_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let loaded = store.load_channels()?;
        Ok(Self::with_channels(loaded, store, events, clock, lock_timeout))
    }

    /// Builds a registry around channels that were already read from `store`.
    pub fn with_channels(
        loaded: Vec<Channel>,
        store: Arc<dyn ChannelStore>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        lock_timeout: Duration,
    ) -> Self {
        let next_index = loaded.iter().map(|c| c.index() + 1).max().unwrap_or(0);
        debug!("Loaded {} channels. Next registry index is {next_index}", loaded.len());
        let channels = loaded.into_iter().map(|c| (c.id().clone(), Arc::new(RwLock::new(c)))).collect();
        ChannelRegistry {
            channels: Arc::new(RwLock::new(channels)),
            store,
            events,
            clock,
            lock_timeout,
            next_index: Arc::new(AtomicU64::new(next_index)),
        }
    }

    pub fn store(&self) -> &Arc<dyn ChannelStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Opens a new channel between two distinct parties. At least one side must bring funds.
    pub async fn open_channel(
        &self,
        party_a: PartyId,
        party_b: PartyId,
        balance_a: SatoshiAmount,
        balance_b: SatoshiAmount,
        timeout_blocks: u64,
    ) -> Result<ChannelId, ChannelError> {
        if party_a.is_empty() || party_b.is_empty() {
            return Err(ChannelError::validation("Party identifiers cannot be empty"));
        }
        if party_a == party_b {
            return Err(ChannelError::validation(format!("A channel needs two distinct parties, got {party_a} twice")));
        }
        let initial = Balances::new(balance_a, balance_b);
        match initial.checked_total() {
            None => return Err(ChannelError::validation("The combined initial balance is too large")),
            Some(total) if total.is_zero() => {
                return Err(ChannelError::validation("At least one party must fund the channel"));
            }
            Some(_) => {}
        }
        if timeout_blocks == 0 {
            return Err(ChannelError::validation("timeout_blocks must be greater than zero"));
        }
        let opened_at = self.clock.now();
        let nonce = rand::rng().random::<u64>();
        let id = ChannelId::derive(&party_a, &party_b, initial, opened_at, nonce);
        if self.channels.read().await.contains_key(&id) {
            return Err(ChannelError::Internal(format!("Channel id collision on {id}")));
        }
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let channel = Channel::new(id.clone(), index, party_a, party_b, initial, timeout_blocks, opened_at);
        self.store.save_channel(&channel)?;
        let event = ChannelEvent::new(ChannelEventKind::Opened, &channel, opened_at);
        self.channels.write().await.insert(id.clone(), Arc::new(RwLock::new(channel)));
        self.events.publish(event);
        Ok(id)
    }

    async fn entry(&self, id: &ChannelId) -> Result<Arc<RwLock<Channel>>, ChannelError> {
        let map = self.channels.read().await;
        map.get(id).cloned().ok_or_else(|| ChannelError::NotFound(id.clone()))
    }

    fn conflict(&self, id: &ChannelId) -> ChannelError {
        let waited_ms = u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX);
        warn!("Timed out after {waited_ms}ms waiting for channel {id}");
        ChannelError::ConcurrencyConflict { channel: id.clone(), waited_ms }
    }

    /// Checks the channel out for writing. Waits up to the lock timeout if someone else has it.
    pub(crate) async fn checkout(&self, id: &ChannelId) -> Result<OwnedRwLockWriteGuard<Channel>, ChannelError> {
        trace!("Trying to check out channel {id}");
        let entry = self.entry(id).await?;
        let guard = tokio::time::timeout(self.lock_timeout, entry.write_owned()).await.map_err(|_| self.conflict(id))?;
        trace!("Check out channel {id} success");
        Ok(guard)
    }

    /// A snapshot of the channel.
    pub async fn get_channel(&self, id: &ChannelId) -> Result<Channel, ChannelError> {
        let entry = self.entry(id).await?;
        let guard = tokio::time::timeout(self.lock_timeout, entry.read()).await.map_err(|_| self.conflict(id))?;
        Ok(guard.clone())
    }

    /// Snapshots of every channel, newest first.
    pub async fn list_channels(&self) -> Vec<Channel> {
        let entries = self.channels.read().await.values().cloned().collect::<Vec<_>>();
        let mut channels = Vec::with_capacity(entries.len());
        for entry in entries {
            channels.push(entry.read().await.clone());
        }
        channels.sort_by(|a, b| b.opened_at().cmp(&a.opened_at()).then(b.index().cmp(&a.index())));
        channels
    }

    /// Snapshots of the channels `party` belongs to, newest first.
    pub async fn list_channels_for_party(&self, party: &PartyId) -> Vec<Channel> {
        self.list_channels().await.into_iter().filter(|c| c.is_party(party)).collect()
    }

    /// Applies a transfer and hands the result to `commit` before it becomes visible.
    ///
    /// The transfer is computed on a copy while the channel is checked out. `commit` then records it (typically
    /// persistence and the ledger append) and only if it succeeds does the copy replace the live record. Waiting for
    /// the channel lock is the only suspension point, so dropping the future can never leave half a payment behind.
    pub async fn apply_payment<T, F>(
        &self,
        id: &ChannelId,
        from: &PartyId,
        to: &PartyId,
        amount: SatoshiAmount,
        commit: F,
    ) -> Result<(Channel, T), ChannelError>
    where
        F: FnOnce(&Channel) -> Result<T, ChannelError>,
    {
        let mut guard = self.checkout(id).await?;
        let mut next = guard.clone();
        next.apply_transfer(from, to, amount, self.clock.now())?;
        let out = commit(&next)?;
        *guard = next.clone();
        Ok((next, out))
    }

    /// Runs `update` against a copy of the channel and, if it changed anything, persists the copy and swaps it in.
    /// Events returned by `update` are published while the channel is still checked out, so they come out in the
    /// order the changes were made.
    pub(crate) async fn update_channel<T, F>(&self, id: &ChannelId, update: F) -> Result<(Channel, T), ChannelError>
    where
        F: FnOnce(&mut Channel) -> Result<(T, Vec<ChannelEventKind>), ChannelError>,
    {
        let mut guard = self.checkout(id).await?;
        let mut next = guard.clone();
        let (out, events) = update(&mut next)?;
        if next != *guard {
            self.store.save_channel(&next)?;
            *guard = next.clone();
        }
        let now = self.clock.now();
        for kind in events {
            self.events.publish(ChannelEvent::new(kind, &next, now));
        }
        Ok((next, out))
    }

    /// Drives the channel through one lifecycle event. Illegal transitions fail with
    /// [`ChannelError::InvalidStateTransition`] and change nothing.
    pub async fn transition(
        &self,
        id: &ChannelId,
        event: LifeCycleEvent,
        party: Option<&PartyId>,
    ) -> Result<Channel, ChannelError> {
        let (channel, _) = self
            .update_channel(id, |channel| {
                channel.transition(event, party)?;
                Ok(((), Vec::new()))
            })
            .await?;
        Ok(channel)
    }

    /// Marks an active channel that has been idle for at least `idle_for` as eligible for a forced close. The idle
    /// time is checked again under the channel lock. Returns `true` if the flag was newly set.
    pub async fn flag_stale(
        &self,
        id: &ChannelId,
        at: Timestamp,
        idle_for: Duration,
    ) -> Result<(Channel, bool), ChannelError> {
        self.update_channel(id, |channel| {
            if !channel.status().is_active() {
                return Err(ChannelError::ChannelClosed { channel: channel.id().clone(), stage: channel.stage() });
            }
            if channel.stale_since.is_some() || at.since(channel.last_activity_at()) < idle_for {
                return Ok((false, Vec::new()));
            }
            channel.stale_since = Some(at);
            Ok((true, vec![ChannelEventKind::FlaggedStale]))
        })
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state_machine::{CloseRequest, LifecycleStage};
    use crate::storage::MemoryStore;

    fn registry_with_timeout(clock: &ManualClock, lock_timeout: Duration) -> ChannelRegistry {
        let store = Arc::new(MemoryStore::new());
        ChannelRegistry::new(store, EventBus::default(), Arc::new(clock.clone()), lock_timeout)
    }

    fn registry(clock: &ManualClock) -> ChannelRegistry {
        registry_with_timeout(clock, Duration::from_secs(5))
    }

    fn sats(n: u64) -> SatoshiAmount {
        SatoshiAmount::from_sats(n)
    }

    #[tokio::test]
    async fn open_channel_validation() {
        let registry = registry(&ManualClock::new(Timestamp::new(1_000)));
        async fn open(r: &ChannelRegistry, a: &str, b: &str, ba: u64, bb: u64, t: u64) -> Result<ChannelId, ChannelError> {
            r.open_channel(a.into(), b.into(), sats(ba), sats(bb), t).await
        }
        assert!(matches!(open(&registry, "alice", "alice", 10, 0, 144).await, Err(ChannelError::Validation(_))));
        assert!(matches!(open(&registry, "", "bob", 10, 0, 144).await, Err(ChannelError::Validation(_))));
        assert!(matches!(open(&registry, "alice", "bob", 0, 0, 144).await, Err(ChannelError::Validation(_))));
        assert!(matches!(open(&registry, "alice", "bob", u64::MAX, 1, 144).await, Err(ChannelError::Validation(_))));
        assert!(matches!(open(&registry, "alice", "bob", 10, 0, 0).await, Err(ChannelError::Validation(_))));
        let id = open(&registry, "alice", "bob", 0, 10, 144).await.expect("B alone may fund the channel");
        let channel = registry.get_channel(&id).await.unwrap();
        assert_eq!(channel.sequence(), 0);
        assert_eq!(channel.stage(), LifecycleStage::Active);
        assert_eq!(channel.opened_at(), Timestamp::new(1_000));
        assert_eq!(channel.closed_at(), None);
    }

    #[tokio::test]
    async fn repeated_pairs_get_distinct_channels() {
        let registry = registry(&ManualClock::new(Timestamp::new(1_000)));
        let id1 = registry.open_channel("alice".into(), "bob".into(), sats(10), sats(0), 144).await.unwrap();
        let id2 = registry.open_channel("alice".into(), "bob".into(), sats(10), sats(0), 144).await.unwrap();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let clock = ManualClock::new(Timestamp::new(1_000));
        let registry = registry(&clock);
        let first = registry.open_channel("alice".into(), "bob".into(), sats(10), sats(0), 144).await.unwrap();
        // Same opening time: the later registry slot wins.
        let second = registry.open_channel("carol".into(), "alice".into(), sats(10), sats(0), 144).await.unwrap();
        clock.advance(Duration::from_secs(60));
        let third = registry.open_channel("alice".into(), "dave".into(), sats(10), sats(0), 144).await.unwrap();
        registry.open_channel("bob".into(), "carol".into(), sats(10), sats(0), 144).await.unwrap();
        let ids = registry.list_channels_for_party(&"alice".into()).await.into_iter().map(|c| c.id().clone());
        assert_eq!(ids.collect::<Vec<_>>(), vec![third, second, first]);
        assert!(registry.list_channels_for_party(&"nobody".into()).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let registry = registry(&ManualClock::default());
        let id = ChannelId::derive(&"a".into(), &"b".into(), Balances::default(), Timestamp::new(0), 0);
        assert!(matches!(registry.get_channel(&id).await, Err(ChannelError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_commit_leaves_channel_unchanged() {
        let registry = registry(&ManualClock::new(Timestamp::new(1_000)));
        let id = registry.open_channel("alice".into(), "bob".into(), sats(1_000), sats(0), 144).await.unwrap();
        let before = registry.get_channel(&id).await.unwrap();
        let result = registry
            .apply_payment(&id, &"alice".into(), &"bob".into(), sats(100), |_| {
                Err::<(), _>(ChannelError::Internal("disk full".into()))
            })
            .await;
        assert!(matches!(result, Err(ChannelError::Internal(_))));
        assert_eq!(registry.get_channel(&id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn busy_channel_times_out() {
        let registry = registry_with_timeout(&ManualClock::default(), Duration::from_millis(50));
        let id = registry.open_channel("alice".into(), "bob".into(), sats(1_000), sats(0), 144).await.unwrap();
        let other = registry.open_channel("carol".into(), "dave".into(), sats(1_000), sats(0), 144).await.unwrap();
        let guard = registry.checkout(&id).await.unwrap();
        let result = registry.apply_payment(&id, &"alice".into(), &"bob".into(), sats(1), |_| Ok(())).await;
        assert!(matches!(result, Err(ChannelError::ConcurrencyConflict { waited_ms: 50, .. })));
        // Other channels are not affected.
        registry.apply_payment(&other, &"carol".into(), &"dave".into(), sats(1), |_| Ok(())).await.unwrap();
        drop(guard);
        registry.apply_payment(&id, &"alice".into(), &"bob".into(), sats(1), |_| Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn illegal_transitions_change_nothing() {
        let registry = registry(&ManualClock::new(Timestamp::new(1_000)));
        let id = registry.open_channel("alice".into(), "bob".into(), sats(1_000), sats(0), 144).await.unwrap();
        let event = LifeCycleEvent::DisputeWindowElapsed(Timestamp::new(5_000));
        let err = registry.transition(&id, event, None).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidStateTransition { .. }));
        let request = CloseRequest { requested_by: "alice".into(), requested_at: Timestamp::new(1_001) };
        let channel = registry.transition(&id, LifeCycleEvent::StartClose(Box::new(request)), None).await.unwrap();
        assert_eq!(channel.stage(), LifecycleStage::Closing);
        let saved = registry.store().load_channels().unwrap();
        assert_eq!(saved[0].stage(), LifecycleStage::Closing);
    }

    #[tokio::test]
    async fn stale_flag_is_set_once() {
        let registry = registry(&ManualClock::new(Timestamp::new(1_000)));
        let id = registry.open_channel("alice".into(), "bob".into(), sats(1_000), sats(0), 144).await.unwrap();
        let mut events = registry.events().subscribe();
        let idle = Duration::from_secs(600);
        let (_, flagged) = registry.flag_stale(&id, Timestamp::new(1_599), idle).await.unwrap();
        assert!(!flagged, "not idle long enough");
        let (channel, flagged) = registry.flag_stale(&id, Timestamp::new(2_000), idle).await.unwrap();
        assert!(flagged);
        assert_eq!(channel.stale_since(), Some(Timestamp::new(2_000)));
        let (_, flagged) = registry.flag_stale(&id, Timestamp::new(3_000), idle).await.unwrap();
        assert!(!flagged);
        let event = events.try_recv().expect("one event");
        assert_eq!(event.kind, ChannelEventKind::FlaggedStale);
        assert!(events.try_recv().is_err());
    }
}
