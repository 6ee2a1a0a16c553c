#![cfg(feature = "dummy_settlement")]
mod common;

use common::*;
use libtally::PartyId;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_on_one_channel_are_serialized() {
    env_logger::try_init().ok();
    let (manager, _clock) = memory_manager();
    let manager = Arc::new(manager);
    let id = alice_bob_channel(&manager, 50_000, 0).await;
    let mut handles = Vec::new();
    for i in 0..10 {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let memo = Some(format!("payment {i}"));
            manager.send_payment(&id, &PartyId::from("alice"), &PartyId::from("bob"), sats(500), memo).await
        }));
    }
    for handle in handles {
        handle.await.expect("task to finish").expect("payment to succeed");
    }
    let channel = manager.get_channel(&id).await.unwrap();
    assert_eq!(channel.balances().party_a, sats(45_000));
    assert_eq!(channel.balances().party_b, sats(5_000));
    assert_eq!(channel.sequence(), 10);
    let mut sequences = manager.get_history(&id).await.unwrap().into_iter().map(|p| p.sequence).collect::<Vec<_>>();
    sequences.sort();
    assert_eq!(sequences, (1..=10).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overdrafting_race_never_goes_negative() {
    let (manager, _clock) = memory_manager();
    let manager = Arc::new(manager);
    let id = alice_bob_channel(&manager, 2_000, 0).await;
    let handles = (0..20)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let id = id.clone();
            tokio::spawn(async move { manager.send_payment(&id, &"alice".into(), &"bob".into(), sats(300), None).await })
        })
        .collect::<Vec<_>>();
    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }
    // 2000 / 300 = 6 payments fit.
    assert_eq!(succeeded, 6);
    let channel = manager.get_channel(&id).await.unwrap();
    assert_eq!(channel.balances().party_a, sats(200));
    assert_eq!(channel.sequence(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_channels_proceed_in_parallel() {
    let (manager, _clock) = memory_manager();
    let manager = Arc::new(manager);
    let mut ids = Vec::new();
    for n in 0..8 {
        let id = manager.open_channel(format!("payer-{n}").into(), format!("payee-{n}").into(), sats(1_000), sats(0), None);
        ids.push((n, id.await.unwrap()));
    }
    let handles = ids
        .iter()
        .cloned()
        .map(|(n, id)| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let (from, to) = (PartyId::from(format!("payer-{n}")), PartyId::from(format!("payee-{n}")));
                for _ in 0..25 {
                    manager.send_payment(&id, &from, &to, sats(10), None).await?;
                }
                Ok::<_, libtally::ChannelError>(())
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    for (_, id) in ids {
        let channel = manager.get_channel(&id).await.unwrap();
        assert_eq!(channel.sequence(), 25);
        assert_eq!(channel.balances().party_a, sats(750));
    }
}
