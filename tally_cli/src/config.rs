use clap::{Parser, Subcommand};
use libtally::{ChannelId, PartyId, SatoshiAmount};
use std::path::PathBuf;

/// Tally payment channels.
///
/// Opens, pays through, and closes off-chain bilateral payment channels kept in a local data directory.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// Path to the configuration file. The default is `$HOME/.tally/config.yml`.
    #[arg(long = "config-file", short = 'c', env = "TALLY_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
    /// Where channels and payment history are stored. Overrides `data_dir` from the configuration file.
    #[arg(long = "data-dir", short = 'd', env = "TALLY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Open a new channel between two parties.
    #[command(name = "open", alias = "new")]
    Open {
        party_a: PartyId,
        party_b: PartyId,
        /// Party A's opening balance, in satoshis, or in BTC with a `btc` suffix (e.g. `0.001btc`).
        #[arg(value_parser = parse_amount)]
        balance_a: SatoshiAmount,
        /// Party B's opening balance, in the same units as `balance_a`.
        #[arg(default_value = "0", value_parser = parse_amount)]
        balance_b: SatoshiAmount,
        /// Channel timeout in blocks. The configured default is used if omitted.
        #[arg(long = "timeout-blocks", short = 't')]
        timeout_blocks: Option<u64>,
    },
    /// Move funds from one side of a channel to the other.
    #[command(name = "pay", alias = "send")]
    Pay {
        channel: ChannelId,
        from: PartyId,
        to: PartyId,
        /// The amount, in satoshis, or in BTC with a `btc` suffix.
        #[arg(value_parser = parse_amount)]
        amount: SatoshiAmount,
        #[arg(long = "memo", short = 'm')]
        memo: Option<String>,
    },
    /// Show a single channel.
    #[command(name = "show", alias = "info")]
    Show { channel: ChannelId },
    /// List channels, newest first.
    #[command(name = "list", alias = "ls")]
    List {
        /// Only list channels this party belongs to.
        #[arg(long = "party", short = 'p')]
        party: Option<PartyId>,
    },
    /// List the payments made through a channel, oldest first.
    #[command(name = "history")]
    History { channel: ChannelId },
    /// Start a cooperative close at the current balances.
    #[command(name = "close")]
    Close { channel: ChannelId, party: PartyId },
    /// Start a unilateral close. The counterparty has until the dispute window ends to object.
    #[command(name = "force-close")]
    ForceClose {
        channel: ChannelId,
        party: PartyId,
        #[arg(long = "reason", short = 'r', default_value = "counterparty unresponsive")]
        reason: String,
    },
    /// Object to a force close started by the counterparty.
    #[command(name = "counter-claim", alias = "dispute")]
    CounterClaim { channel: ChannelId, party: PartyId, note: String },
    /// Close a contested channel once the dispute has been settled out of band.
    #[command(name = "resolve")]
    Resolve {
        channel: ChannelId,
        #[arg(default_value = "")]
        note: String,
    },
    /// Acknowledge that a closing channel's settlement has been finalized.
    #[command(name = "settle", alias = "confirm")]
    Settle {
        channel: ChannelId,
        /// The reference the settlement layer returned when the close was submitted.
        #[arg(long = "reference")]
        reference: Option<String>,
    },
    /// Run one timeout sweep: finalize expired disputes and flag idle channels.
    #[command(name = "sweep")]
    Sweep,
    /// Keep sweeping on a timer and print channel events until interrupted.
    #[command(name = "watch")]
    Watch {
        /// Seconds between sweeps.
        #[arg(long = "interval", short = 'i', default_value_t = 60)]
        interval_secs: u64,
    },
}

/// Parses `1500`, `1500sats` or `0.000015btc` into an amount.
pub fn parse_amount(s: &str) -> Result<SatoshiAmount, String> {
    let s = s.trim().to_ascii_lowercase();
    if let Some(btc) = s.strip_suffix("btc") {
        return SatoshiAmount::from_btc(btc.trim()).ok_or_else(|| format!("'{s}' is not a valid BTC amount"));
    }
    let sats = s.strip_suffix("sats").or_else(|| s.strip_suffix("sat")).unwrap_or(&s).trim();
    sats.parse::<u64>().map(SatoshiAmount::from_sats).map_err(|e| format!("'{s}' is not a valid amount. {e}"))
}

pub struct GlobalOptions {
    pub config_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn to_parts(self) -> (GlobalOptions, CliCommand) {
        let global = GlobalOptions { config_file: self.config_file, data_dir: self.data_dir };
        (global, self.command)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_pay() {
        let config = Config::try_parse_from([
            "tally",
            "--data-dir",
            "/tmp/tally",
            "pay",
            "TCH4a7024e7fd6f5c6a2d0131d12fd91ecd",
            "alice",
            "bob",
            "1500",
            "-m",
            "lunch",
        ])
        .expect("valid arguments");
        let (options, command) = config.to_parts();
        assert_eq!(options.data_dir, Some(PathBuf::from("/tmp/tally")));
        match command {
            CliCommand::Pay { channel, from, to, amount, memo } => {
                assert_eq!(channel.name(), "TCH4a7024e7fd6f5c6a2d0131d12fd91ecd");
                assert_eq!(from.as_str(), "alice");
                assert_eq!(to.as_str(), "bob");
                assert_eq!(amount, SatoshiAmount::from_sats(1500));
                assert_eq!(memo.as_deref(), Some("lunch"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn amounts_in_sats_or_btc() {
        assert_eq!(parse_amount("1500"), Ok(SatoshiAmount::from_sats(1_500)));
        assert_eq!(parse_amount("1500 sats"), Ok(SatoshiAmount::from_sats(1_500)));
        assert_eq!(parse_amount("0.001btc"), Ok(SatoshiAmount::from_sats(100_000)));
        assert_eq!(parse_amount("2 BTC"), Ok(SatoshiAmount::from_sats(200_000_000)));
        assert!(parse_amount("0.000000001btc").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("lots").is_err());
        let config = Config::try_parse_from(["tally", "open", "alice", "bob", "0.5btc", "1000"]).unwrap();
        match config.command {
            CliCommand::Open { balance_a, balance_b, .. } => {
                assert_eq!(balance_a, SatoshiAmount::from_sats(50_000_000));
                assert_eq!(balance_b, SatoshiAmount::from_sats(1_000));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn bad_channel_id_is_rejected() {
        assert!(Config::try_parse_from(["tally", "show", "not-a-channel"]).is_err());
    }

    #[test]
    fn open_defaults() {
        let config = Config::try_parse_from(["tally", "open", "alice", "bob", "100000"]).unwrap();
        match config.command {
            CliCommand::Open { balance_a, balance_b, timeout_blocks, .. } => {
                assert_eq!(balance_a, SatoshiAmount::from_sats(100_000));
                assert_eq!(balance_b, SatoshiAmount::ZERO);
                assert_eq!(timeout_blocks, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
