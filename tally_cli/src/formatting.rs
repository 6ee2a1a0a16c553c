use libtally::monitor::TimeoutAction;
use libtally::state_machine::ChannelStatus;
use libtally::{Channel, PartyId, Payment, SatoshiAmount};
use prettytable::format::{FormatBuilder, LinePosition, LineSeparator, TableFormat};
use prettytable::{row, Table};

fn markdown_format() -> TableFormat {
    FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn markdown_table() -> Table {
    let mut table = Table::new();
    table.set_format(markdown_format());
    table
}

/// `123456789 sats` as `1.23456789 BTC`.
pub fn btc(amount: SatoshiAmount) -> String {
    let (whole, fraction) = amount.to_btc_parts();
    format!("{whole}.{fraction:08} BTC")
}

pub fn channel_table(channels: &[Channel]) -> String {
    if channels.is_empty() {
        return "No channels found.".to_string();
    }
    let mut table = markdown_table();
    table.set_titles(row!["Channel", "Party A", "Balance A", "Party B", "Balance B", "Seq", "Status", "Opened"]);
    for channel in channels {
        let balances = channel.balances();
        table.add_row(row![
            channel.id(),
            channel.party_a(),
            r->balances.party_a,
            channel.party_b(),
            r->balances.party_b,
            r->channel.sequence(),
            channel.stage(),
            channel.opened_at()
        ]);
    }
    table.to_string()
}

/// A key/value view of one channel, including the details of whichever stage it is in.
pub fn channel_details(channel: &Channel) -> String {
    let mut table = markdown_table();
    table.set_titles(row!["Field", "Value"]);
    let balances = channel.balances();
    let initial = channel.initial_balances();
    table.add_row(row!["Channel", channel.id()]);
    table.add_row(row!["Status", channel.stage()]);
    let side = |party: &PartyId, now: SatoshiAmount, opened: SatoshiAmount| {
        format!("{party}: {now} ({}), opened with {opened}", btc(now))
    };
    table.add_row(row!["Party A", side(channel.party_a(), balances.party_a, initial.party_a)]);
    table.add_row(row!["Party B", side(channel.party_b(), balances.party_b, initial.party_b)]);
    table.add_row(row!["Sequence", channel.sequence()]);
    table.add_row(row!["Timeout", format!("{} blocks", channel.timeout_blocks())]);
    table.add_row(row!["Opened", channel.opened_at()]);
    table.add_row(row!["Last activity", channel.last_activity_at()]);
    if let Some(since) = channel.stale_since() {
        table.add_row(row!["Stale since", since]);
    }
    match channel.status() {
        ChannelStatus::Active => {}
        ChannelStatus::Closing(closing) => {
            table.add_row(row!["Close requested", format!("by {} at {}", closing.requested_by(), closing.requested_at())]);
            let settlement = closing.settlement().map(|r| r.to_string()).unwrap_or_else(|| "not submitted".into());
            table.add_row(row!["Settlement", settlement]);
            if let Some(err) = closing.last_settlement_error() {
                table.add_row(row!["Last error", err]);
            }
        }
        ChannelStatus::Disputed(dispute) => {
            table.add_row(row!["Force closed", format!("by {} at {}", dispute.initiated_by(), dispute.started_at())]);
            table.add_row(row!["Reason", dispute.reason()]);
            table.add_row(row!["Window ends", dispute.window_ends()]);
            if let Some(claim) = dispute.counter_claim() {
                table.add_row(row!["Counter-claim", format!("by {} at {}: {}", claim.claimant, claim.at, claim.note)]);
            }
        }
        ChannelStatus::Closed(closed) => {
            table.add_row(row!["Closed", format!("{} ({})", closed.closed_at(), closed.reason())]);
            if let Some(reference) = closed.settlement() {
                table.add_row(row!["Settlement", reference]);
            }
        }
    }
    table.to_string()
}

pub fn history_table(payments: &[Payment]) -> String {
    if payments.is_empty() {
        return "No payments yet.".to_string();
    }
    let mut table = markdown_table();
    table.set_titles(row!["Seq", "Payment", "From", "To", "Amount", "Applied", "Memo"]);
    for payment in payments {
        table.add_row(row![
            r->payment.sequence,
            payment.id,
            payment.from,
            payment.to,
            r->payment.amount,
            payment.applied_at,
            payment.memo.as_deref().unwrap_or("")
        ]);
    }
    table.to_string()
}

pub fn timeout_actions(actions: &[TimeoutAction]) -> String {
    if actions.is_empty() {
        return "Nothing to do.".to_string();
    }
    actions.iter().map(|a| a.to_string()).collect::<Vec<_>>().join("\n")
}
