use crate::error::ChannelError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_BLOCKS: u64 = 144;
pub const DEFAULT_BLOCK_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

/// How closing channels reach the settlement layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// No settlement layer. Cooperative closes finish immediately.
    #[default]
    None,
    /// Closing intents are submitted to the settlement service and wait for an explicit acknowledgment.
    Manual,
}

/// Engine configuration. Every field has a default, so a partial file is fine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Root directory of the file store. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Timeout used when a channel is opened without one.
    pub default_timeout_blocks: u64,
    /// Wall-clock length of one block, used to turn block counts into durations.
    pub block_interval_secs: u64,
    /// Length of the dispute window in blocks. Defaults to the channel's own `timeout_blocks`.
    pub dispute_window_blocks: Option<u64>,
    /// Blocks without activity before a channel is flagged stale. Defaults to the channel's `timeout_blocks`.
    pub stale_after_blocks: Option<u64>,
    /// How long a request waits for a busy channel before giving up.
    pub lock_timeout_ms: u64,
    pub settlement: SettlementMode,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            data_dir: None,
            default_timeout_blocks: DEFAULT_TIMEOUT_BLOCKS,
            block_interval_secs: DEFAULT_BLOCK_INTERVAL_SECS,
            dispute_window_blocks: None,
            stale_after_blocks: None,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            settlement: SettlementMode::None,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.default_timeout_blocks == 0 {
            return Err(ChannelError::validation("default_timeout_blocks must be greater than zero"));
        }
        if self.block_interval_secs == 0 {
            return Err(ChannelError::validation("block_interval_secs must be greater than zero"));
        }
        if self.dispute_window_blocks == Some(0) || self.stale_after_blocks == Some(0) {
            return Err(ChannelError::validation("block counts must be greater than zero"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ChannelError::validation("lock_timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            block_interval: Duration::from_secs(self.block_interval_secs),
            dispute_window_blocks: self.dispute_window_blocks,
            stale_after_blocks: self.stale_after_blocks,
        }
    }
}

/// Converts a channel's block-denominated timeouts into wall-clock durations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub block_interval: Duration,
    pub dispute_window_blocks: Option<u64>,
    pub stale_after_blocks: Option<u64>,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        ChannelConfig::default().timeout_policy()
    }
}

impl TimeoutPolicy {
    pub fn blocks(&self, count: u64) -> Duration {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        self.block_interval.saturating_mul(count)
    }

    pub fn dispute_window(&self, timeout_blocks: u64) -> Duration {
        self.blocks(self.dispute_window_blocks.unwrap_or(timeout_blocks))
    }

    pub fn stale_after(&self, timeout_blocks: u64) -> Duration {
        self.blocks(self.stale_after_blocks.unwrap_or(timeout_blocks))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: ChannelConfig = ron::from_str("(block_interval_secs: 60, settlement: manual)").unwrap();
        assert_eq!(config.block_interval_secs, 60);
        assert_eq!(config.settlement, SettlementMode::Manual);
        assert_eq!(config.default_timeout_blocks, DEFAULT_TIMEOUT_BLOCKS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn policy_converts_blocks() {
        let policy = TimeoutPolicy { block_interval: Duration::from_secs(600), ..Default::default() };
        assert_eq!(policy.dispute_window(6), Duration::from_secs(3_600));
        let policy = TimeoutPolicy { dispute_window_blocks: Some(2), stale_after_blocks: Some(10), ..policy };
        assert_eq!(policy.dispute_window(144), Duration::from_secs(1_200));
        assert_eq!(policy.stale_after(144), Duration::from_secs(6_000));
    }

    #[test]
    fn zero_values_are_rejected() {
        let config = ChannelConfig { block_interval_secs: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ChannelError::Validation(_))));
    }
}
