use crate::config::CliCommand;
use crate::formatting::{channel_details, channel_table, history_table, timeout_actions};
use anyhow::anyhow;
use libtally::config::ChannelConfig;
use libtally::settlement::dummy_impl::DummySettlement;
use libtally::settlement::SettlementReference;
use libtally::ChannelManager;
use log::*;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

pub type Manager = ChannelManager<DummySettlement>;

pub fn open_manager(config: ChannelConfig) -> Result<Manager, anyhow::Error> {
    let manager = ChannelManager::open(config, DummySettlement::new())?;
    Ok(manager)
}

/// Runs a one-shot command and returns what should be printed.
pub async fn execute(command: CliCommand, manager: &Manager) -> Result<String, anyhow::Error> {
    let output = match command {
        CliCommand::Open { party_a, party_b, balance_a, balance_b, timeout_blocks } => {
            let id = manager.open_channel(party_a.clone(), party_b.clone(), balance_a, balance_b, timeout_blocks).await?;
            format!("New channel open: {id}. {party_a}: {balance_a}, {party_b}: {balance_b}")
        }
        CliCommand::Pay { channel, from, to, amount, memo } => {
            let payment = manager.send_payment(&channel, &from, &to, amount, memo).await?;
            let balances = manager.get_channel(&channel).await?.balances();
            format!("Payment #{} ({}) applied. Balances are now {balances}", payment.sequence, payment.id)
        }
        CliCommand::Show { channel } => channel_details(&manager.get_channel(&channel).await?),
        CliCommand::List { party } => {
            let channels = match party {
                Some(party) => manager.list_channels_for_party(&party).await,
                None => manager.list_channels().await,
            };
            channel_table(&channels)
        }
        CliCommand::History { channel } => history_table(&manager.get_history(&channel).await?),
        CliCommand::Close { channel, party } => {
            let channel = manager.close_channel(&channel, &party).await?;
            format!("Channel {} is {}.\n{}", channel.id(), channel.stage(), channel_details(&channel))
        }
        CliCommand::ForceClose { channel, party, reason } => {
            let channel = manager.force_close(&channel, &party, reason).await?;
            let window_ends = channel
                .status()
                .as_disputed()
                .map(|d| d.window_ends().to_string())
                .ok_or_else(|| anyhow!("Channel {} did not enter a dispute", channel.id()))?;
            format!("Channel {} is disputed. It closes at {window_ends} unless counter-claimed.", channel.id())
        }
        CliCommand::CounterClaim { channel, party, note } => {
            let channel = manager.counter_claim(&channel, &party, note).await?;
            format!("Counter-claim recorded on {}. It stays disputed until resolved.", channel.id())
        }
        CliCommand::Resolve { channel, note } => {
            let channel = manager.resolve_dispute(&channel, note).await?;
            format!("Channel {} is {}.", channel.id(), channel.stage())
        }
        CliCommand::Settle { channel, reference } => {
            let reference = reference.map(SettlementReference::new);
            let channel = manager.confirm_settlement(&channel, reference).await?;
            format!("Channel {} is {}.", channel.id(), channel.stage())
        }
        CliCommand::Sweep => timeout_actions(&manager.check_timeouts().await),
        CliCommand::Watch { .. } => return Err(anyhow!("`watch` runs until interrupted and has no one-shot output")),
    };
    Ok(output)
}

/// Runs the timeout monitor and prints every channel event until Ctrl-C.
pub async fn watch(manager: &Manager, interval: Duration) -> Result<(), anyhow::Error> {
    let mut events = manager.subscribe();
    let monitor = manager.spawn_monitor(interval);
    println!("Watching channels every {}s. Press Ctrl-C to stop.", interval.as_secs());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{event}"),
                Err(RecvError::Lagged(missed)) => warn!("Missed {missed} channel events"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    monitor.abort();
    info!("Watch stopped");
    Ok(())
}
