//! Reseller Monitor Library
//!
//! Affiliate swap monitoring: pulls settled swaps per affiliate from the
//! explorer feed, keeps live totals and a searchable log, and posts swap
//! cards and running totals to Telegram.
//! This library exposes core modules for the binary and for testing.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod monitoring;
pub mod notifications;
pub mod utils;

// Re-export commonly used types for tests
pub use config::{AffiliateConfig, AppConfig};
pub use db::DbPool;
pub use error::{AppError, AppResult};
pub use models::{AppFee, Cursor, Transaction, TransactionStatus};
pub use monitoring::{
    AffiliatePoller, CursorStore, LabelResolver, LogBuffer, MonitorContext, StatsAggregator,
    StatsSnapshot, TransactionSource,
};
pub use notifications::{NotificationSink, Notifier};
