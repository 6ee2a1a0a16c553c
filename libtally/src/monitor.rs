use crate::channel_id::ChannelId;
use crate::config::TimeoutPolicy;
use crate::error::ChannelError;
use crate::events::ChannelEventKind;
use crate::helpers::Timestamp;
use crate::registry::ChannelRegistry;
use crate::state_machine::{ChannelStatus, LifeCycleEvent};
use log::*;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorAction {
    /// An uncontested dispute ran out its window and the channel was closed.
    DisputeFinalized,
    /// An idle channel was marked as eligible for a forced close.
    FlaggedStale,
    /// The channel could not be processed this round.
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutAction {
    pub channel_id: ChannelId,
    pub action: MonitorAction,
}

impl Display for TimeoutAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.action {
            MonitorAction::DisputeFinalized => write!(f, "{}: dispute finalized", self.channel_id),
            MonitorAction::FlaggedStale => write!(f, "{}: flagged stale", self.channel_id),
            MonitorAction::Failed(reason) => write!(f, "{}: failed. {reason}", self.channel_id),
        }
    }
}

/// Sweeps the registry for expired disputes and idle channels.
///
/// Stale channels are only flagged. Closing them is still up to one of the parties.
#[derive(Clone)]
pub struct TimeoutMonitor {
    registry: ChannelRegistry,
    policy: TimeoutPolicy,
}

impl TimeoutMonitor {
    pub fn new(registry: ChannelRegistry, policy: TimeoutPolicy) -> Self {
        TimeoutMonitor { registry, policy }
    }

    /// One sweep. Each channel that changed is reported once; a failure on one channel does not stop the rest.
    pub async fn check_timeouts(&self) -> Vec<TimeoutAction> {
        let now = self.registry.now();
        let mut actions = Vec::new();
        for channel in self.registry.list_channels().await {
            let id = channel.id().clone();
            let result = match channel.status() {
                ChannelStatus::Disputed(dispute) if !dispute.is_contested() && dispute.window_elapsed(now) => {
                    self.finalize_dispute(&id, now).await.map(|done| done.then_some(MonitorAction::DisputeFinalized))
                }
                ChannelStatus::Active if channel.stale_since().is_none() => {
                    let idle_for = self.policy.stale_after(channel.timeout_blocks());
                    if now.since(channel.last_activity_at()) < idle_for {
                        continue;
                    }
                    match self.registry.flag_stale(&id, now, idle_for).await {
                        Ok((_, flagged)) => Ok(flagged.then_some(MonitorAction::FlaggedStale)),
                        // Closed between the snapshot and the check.
                        Err(ChannelError::ChannelClosed { .. }) => Ok(None),
                        Err(e) => Err(e),
                    }
                }
                _ => Ok(None),
            };
            match result {
                Ok(Some(action)) => actions.push(TimeoutAction { channel_id: id, action }),
                Ok(None) => {}
                Err(e) => {
                    warn!("Timeout check failed for channel {id}: {e}");
                    actions.push(TimeoutAction { channel_id: id, action: MonitorAction::Failed(e.to_string()) });
                }
            }
        }
        trace!("Timeout sweep finished with {} action(s)", actions.len());
        actions
    }

    async fn finalize_dispute(&self, id: &ChannelId, now: Timestamp) -> Result<bool, ChannelError> {
        let (_, done) = self
            .registry
            .update_channel(id, |channel| match channel.status().as_disputed() {
                Some(dispute) if !dispute.is_contested() && dispute.window_elapsed(now) => {
                    channel.transition(LifeCycleEvent::DisputeWindowElapsed(now), None)?;
                    let events = channel
                        .status()
                        .as_closed()
                        .map(|c| ChannelEventKind::Closed(c.reason().clone()))
                        .into_iter()
                        .collect();
                    Ok((true, events))
                }
                _ => Ok((false, Vec::new())),
            })
            .await?;
        Ok(done)
    }

    /// Runs [`check_timeouts`](Self::check_timeouts) every `interval` on the tokio runtime until the task is
    /// aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for action in self.check_timeouts().await {
                    info!("⚡️ Timeout monitor: {action}");
                }
            }
        })
    }
}
