//! Notification service for the reseller monitor
//!
//! Posts a card per ingested swap to the affiliate's forum thread and keeps
//! the running totals visible:
//! - thread title per affiliate (`$1,234 Profit · Name`)
//! - main chat description (grand total substituted into a `$` placeholder)
//!
//! Delivery is best-effort. Every call makes a single attempt and reports the
//! failure to the caller, which logs it and moves on.

pub mod card;
pub mod telegram;

pub use card::{render_card, render_message, substitute_total, thread_title};
pub use telegram::TelegramClient;

use crate::config::AffiliateConfig;
use crate::error::AppResult;
use crate::models::Transaction;
use crate::monitoring::{LabelResolver, StatsSnapshot};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Messaging API the notifier writes to
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Send an HTML message to a forum thread (`None` posts to the general topic)
    async fn send_message(&self, thread_id: Option<i64>, html: &str) -> AppResult<()>;

    /// Rename a forum thread
    async fn edit_thread_title(&self, thread_id: i64, title: &str) -> AppResult<()>;

    /// Current description of a chat, if any
    async fn chat_description(&self, chat_id: i64) -> AppResult<Option<String>>;

    /// Replace the description of a chat
    async fn set_chat_description(&self, chat_id: i64, description: &str) -> AppResult<()>;
}

/// Per-key minimum interval between sends
struct RateLimiter {
    /// Last sent time per key
    last_sent: RwLock<HashMap<String, Instant>>,
    /// Minimum interval between sends for one key
    interval: Duration,
}

impl RateLimiter {
    fn new(interval_seconds: u64) -> Self {
        Self {
            last_sent: RwLock::new(HashMap::new()),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    fn can_send(&self, key: &str) -> bool {
        let last_sent = self.last_sent.read();
        match last_sent.get(key) {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    fn mark_sent(&self, key: &str) {
        self.last_sent
            .write()
            .insert(key.to_string(), Instant::now());
    }
}

/// Routing for one affiliate
#[derive(Debug, Clone)]
struct Destination {
    name: String,
    thread_id: Option<i64>,
}

/// Renders and routes notifications for every registered affiliate
pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
    destinations: HashMap<String, Destination>,
    main_chat_id: i64,
    labels: Arc<LabelResolver>,
    title_limiter: RateLimiter,
}

impl Notifier {
    /// Create a notifier; with no sink every call is a no-op
    pub fn new(
        sink: Option<Arc<dyn NotificationSink>>,
        affiliates: &[AffiliateConfig],
        main_chat_id: i64,
        title_min_interval_secs: u64,
        labels: Arc<LabelResolver>,
    ) -> Self {
        let destinations = affiliates
            .iter()
            .map(|a| {
                (
                    a.id.clone(),
                    Destination {
                        name: a.name.clone(),
                        thread_id: a.thread_id,
                    },
                )
            })
            .collect();

        Self {
            sink,
            destinations,
            main_chat_id,
            labels,
            title_limiter: RateLimiter::new(title_min_interval_secs),
        }
    }

    /// Notifier that never sends anything
    pub fn disabled(labels: Arc<LabelResolver>) -> Self {
        Self::new(None, &[], 0, 0, labels)
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    fn display_name<'a>(&'a self, affiliate_id: &'a str) -> &'a str {
        self.destinations
            .get(affiliate_id)
            .map(|d| d.name.as_str())
            .unwrap_or(affiliate_id)
    }

    /// Render the card for `tx` and post it to the affiliate's thread
    pub async fn post_transaction(
        &self,
        affiliate_id: &str,
        tx: &Transaction,
        fee_usd: f64,
        stats: &StatsSnapshot,
    ) -> AppResult<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };

        let card = render_card(
            self.display_name(affiliate_id),
            tx,
            fee_usd,
            stats,
            &self.labels,
        );
        let message = render_message(&card, tx);
        let thread_id = self
            .destinations
            .get(affiliate_id)
            .and_then(|d| d.thread_id);

        sink.send_message(thread_id, &message).await?;

        tracing::debug!(
            affiliate = %affiliate_id,
            deposit_address = %tx.deposit_address,
            "Posted swap card"
        );
        Ok(())
    }

    /// Rewrite the affiliate's thread title with its running total.
    ///
    /// Throttled per affiliate unless `force` is set. Returns whether a
    /// rename was sent.
    pub async fn update_thread_title(
        &self,
        affiliate_id: &str,
        total_fee_usd: f64,
        force: bool,
    ) -> AppResult<bool> {
        let Some(sink) = &self.sink else {
            return Ok(false);
        };
        let Some(thread_id) = self
            .destinations
            .get(affiliate_id)
            .and_then(|d| d.thread_id)
        else {
            return Ok(false);
        };

        if !force && !self.title_limiter.can_send(affiliate_id) {
            tracing::debug!(affiliate = %affiliate_id, "Thread title update throttled");
            return Ok(false);
        }

        let title = thread_title(self.display_name(affiliate_id), total_fee_usd);
        sink.edit_thread_title(thread_id, &title).await?;
        self.title_limiter.mark_sent(affiliate_id);

        tracing::info!(affiliate = %affiliate_id, title = %title, "Thread title updated");
        Ok(true)
    }

    /// Substitute the grand total into the main chat's description.
    ///
    /// Does nothing when the description no longer holds a placeholder.
    /// Returns whether the description was rewritten.
    pub async fn update_aggregate_description(&self, total_fee_usd: f64) -> AppResult<bool> {
        let Some(sink) = &self.sink else {
            return Ok(false);
        };
        if self.main_chat_id == 0 {
            return Ok(false);
        }

        let current = sink
            .chat_description(self.main_chat_id)
            .await?
            .unwrap_or_default();

        let Some(updated) = substitute_total(&current, total_fee_usd) else {
            tracing::debug!(
                chat_id = self.main_chat_id,
                "Chat description has no placeholder, skipping"
            );
            return Ok(false);
        };

        sink.set_chat_description(self.main_chat_id, &updated)
            .await?;

        tracing::info!(chat_id = self.main_chat_id, "Chat description updated");
        Ok(true)
    }
}
