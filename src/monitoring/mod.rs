//! Monitoring module for affiliate swap activity
//!
//! Pulls settled swaps per affiliate from the explorer feed, keeps live
//! per-affiliate totals and a bounded searchable log, and commits a durable
//! pagination cursor after every processed page.

pub mod cursor_store;
pub mod explorer;
pub mod fees;
pub mod live_stats;
pub mod log_buffer;
pub mod poller;
pub mod report;

pub use cursor_store::{CursorStore, MemoryCursorStore, SqliteCursorStore};
pub use explorer::{ExplorerClient, Page, TransactionSource};
pub use fees::{fee_usd, total_bps, LabelResolver};
pub use live_stats::{AffiliateStats, LiveStats, StatsAggregator, StatsSnapshot};
pub use log_buffer::{LogBuffer, LogEntry, LogFilter};
pub use poller::{
    start_polling_task, start_summary_task, AffiliatePoller, CycleOutcome, CycleReport,
    MonitorContext, PollerSettings, PollerStatus,
};
