#![allow(dead_code)]

use libtally::clock::ManualClock;
use libtally::config::{ChannelConfig, SettlementMode};
use libtally::helpers::Timestamp;
use libtally::settlement::dummy_impl::DummySettlement;
use libtally::storage::{ChannelStore, MemoryStore};
use libtally::{ChannelId, ChannelManager, SatoshiAmount};
use std::sync::Arc;

pub const START: u64 = 1_700_000_000;

pub fn sats(n: u64) -> SatoshiAmount {
    SatoshiAmount::from_sats(n)
}

pub fn manager_with(
    config: ChannelConfig,
    store: Arc<dyn ChannelStore>,
    settlement: DummySettlement,
) -> (ChannelManager<DummySettlement>, ManualClock) {
    let clock = ManualClock::new(Timestamp::new(START));
    let manager =
        ChannelManager::with_parts(config, store, Arc::new(clock.clone()), settlement).expect("manager to start");
    (manager, clock)
}

pub fn memory_manager() -> (ChannelManager<DummySettlement>, ManualClock) {
    manager_with(ChannelConfig::default(), Arc::new(MemoryStore::new()), DummySettlement::new())
}

pub fn manual_settlement_manager(settlement: DummySettlement) -> (ChannelManager<DummySettlement>, ManualClock) {
    let config = ChannelConfig { settlement: SettlementMode::Manual, ..Default::default() };
    manager_with(config, Arc::new(MemoryStore::new()), settlement)
}

pub async fn alice_bob_channel(manager: &ChannelManager<DummySettlement>, a: u64, b: u64) -> ChannelId {
    manager.open_channel("alice".into(), "bob".into(), sats(a), sats(b), None).await.expect("channel to open")
}
