//! Read-only reporting view over live stats and the transaction log

use serde::Serialize;

use super::{LogBuffer, LogEntry, LogFilter, StatsAggregator};
use crate::notifications::card::near_tx_url;
use crate::utils::{format_commas, format_log_time, format_usd, trim_amount};

/// Rows returned when the caller gives no limit
pub const DEFAULT_LOG_LIMIT: usize = 500;

/// One display row of the transaction log
#[derive(Debug, Clone, Serialize)]
pub struct LogRow {
    pub reseller: String,
    pub amount_in: String,
    pub token_in: String,
    pub chain_in: String,
    pub amount_out: String,
    pub token_out: String,
    pub chain_out: String,
    pub fee: String,
    pub fee_usd: f64,
    pub timestamp: String,
    pub sender: String,
    pub recipient: String,
    pub deposit_address: String,
    pub near_tx_hash: Option<String>,
    pub near_tx_url: Option<String>,
}

impl From<&LogEntry> for LogRow {
    fn from(entry: &LogEntry) -> Self {
        let tx = &entry.tx;
        let near_tx_hash = tx.first_near_hash().map(str::to_string);
        let near_tx_url = near_tx_hash.as_deref().map(near_tx_url);

        Self {
            reseller: entry.reseller.clone(),
            amount_in: trim_amount(&tx.amount_in_formatted, 6),
            token_in: entry.token_in.clone(),
            chain_in: entry.chain_in.clone(),
            amount_out: trim_amount(&tx.amount_out_formatted, 6),
            token_out: entry.token_out.clone(),
            chain_out: entry.chain_out.clone(),
            fee: format_usd(entry.fee_usd),
            fee_usd: entry.fee_usd,
            timestamp: format_log_time(tx.created_at_timestamp),
            sender: tx.first_sender().unwrap_or_default().to_string(),
            recipient: tx.recipient.clone(),
            deposit_address: tx.deposit_address.clone(),
            near_tx_hash,
            near_tx_url,
        }
    }
}

/// Stats row for one reseller, raw and formatted
#[derive(Debug, Clone, Serialize)]
pub struct ResellerRow {
    pub id: String,
    pub name: String,
    pub fee_usd: f64,
    pub volume_usd: f64,
    pub swaps: u64,
    pub fee: String,
    pub volume: String,
    pub swaps_formatted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResellerReport {
    pub resellers: Vec<ResellerRow>,
    pub total_fee_usd: f64,
    pub total_fee: String,
}

/// Newest-first log rows matching `filter`.
///
/// `limit` defaults to [`DEFAULT_LOG_LIMIT`] and never exceeds the buffer's
/// capacity.
pub fn log_rows(log: &LogBuffer, filter: &LogFilter, limit: Option<usize>) -> Vec<LogRow> {
    let limit = limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .min(log.capacity());

    log.snapshot(limit, |e| filter.matches(e))
        .iter()
        .map(|e| LogRow::from(e.as_ref()))
        .collect()
}

/// Per-reseller stats in registration order plus the grand total
pub fn reseller_report(aggregator: &StatsAggregator) -> ResellerReport {
    let resellers = aggregator
        .per_affiliate()
        .into_iter()
        .map(|a| ResellerRow {
            fee: format_usd(a.stats.fee_usd),
            volume: format_usd(a.stats.volume_usd),
            swaps_formatted: format_commas(a.stats.swap_count as i64),
            fee_usd: a.stats.fee_usd,
            volume_usd: a.stats.volume_usd,
            swaps: a.stats.swap_count,
            id: a.id,
            name: a.name,
        })
        .collect();

    let total_fee_usd = aggregator.total_fee_usd();
    ResellerReport {
        resellers,
        total_fee_usd,
        total_fee: format_usd(total_fee_usd),
    }
}
