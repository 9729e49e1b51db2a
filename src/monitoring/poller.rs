//! Per-affiliate polling loop
//!
//! Each registered affiliate gets one [`AffiliatePoller`] driven by its own
//! background task. A cycle pages forward from the committed cursor:
//!
//! 1. fetch a page strictly after the cursor
//! 2. for each transaction in page order: compute the fee, record it into
//!    live stats, append it to the log, post its card
//! 3. commit the cursor to the page's last transaction
//! 4. continue with the next page if this one was full
//!
//! The cursor only moves after step 2, so a crash or a failed commit means
//! the page is fetched and counted again (at-least-once), never skipped.
//! Notification failures are logged and dropped.
//!
//! The first cycles after startup replay history from the oldest page to
//! rebuild the in-memory stats without posting anything, until they reach
//! the committed cursor.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::{
    fee_usd, CursorStore, Page, LabelResolver, LogBuffer, LogEntry, StatsAggregator, StatsSnapshot,
    TransactionSource,
};
use crate::config::{AffiliateConfig, MonitoringConfig};
use crate::error::{AppError, AppResult};
use crate::metrics::MetricsState;
use crate::models::{Cursor, Transaction};
use crate::notifications::Notifier;

/// Components shared by every poller and the reporting surface
#[derive(Clone)]
pub struct MonitorContext {
    pub source: Arc<dyn TransactionSource>,
    pub cursors: Arc<dyn CursorStore>,
    pub aggregator: Arc<StatsAggregator>,
    pub log: Arc<LogBuffer>,
    pub labels: Arc<LabelResolver>,
    pub notifier: Arc<Notifier>,
    pub metrics: Arc<MetricsState>,
}

/// Paging limits for a poller
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Transactions requested per page
    pub page_size: usize,
    /// Full pages drained before a cycle yields
    pub max_pages_per_cycle: usize,
    /// Rebuild stats from the oldest page on startup
    pub replay_history: bool,
}

impl From<&MonitoringConfig> for PollerSettings {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            max_pages_per_cycle: config.max_pages_per_cycle.max(1),
            replay_history: config.replay_history_on_start,
        }
    }
}

/// What a finished cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Pages fetched that held transactions
    pub pages: usize,
    /// New transactions aggregated, logged and notified
    pub transactions: usize,
    /// Historical transactions replayed into stats without notification
    pub replayed: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.transactions == 0 && self.replayed == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle for the same affiliate was still running
    Skipped,
    Completed(CycleReport),
}

/// Health of one affiliate's poller, for diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollerStatus {
    pub affiliate: String,
    pub name: String,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Transactions recorded since process start, replay included
    pub ingested: u64,
    pub backfill_complete: bool,
}

/// Startup replay position, kept across cycles so a failed replay resumes
/// where it stopped instead of counting history twice
#[derive(Debug, Default)]
struct ReplayProgress {
    /// Last replayed transaction
    position: Cursor,
    /// Committed cursor the replay runs up to, loaded on first use
    committed: Option<Cursor>,
    finished: bool,
}

#[derive(Debug, Default)]
struct CycleState {
    replay: Option<ReplayProgress>,
}

/// Polls one affiliate's transaction feed
pub struct AffiliatePoller {
    affiliate: AffiliateConfig,
    ctx: MonitorContext,
    settings: PollerSettings,
    /// Held for the duration of a cycle; cycles never overlap
    cycle: tokio::sync::Mutex<CycleState>,
    status: RwLock<PollerStatus>,
}

impl AffiliatePoller {
    pub fn new(
        affiliate: AffiliateConfig,
        ctx: MonitorContext,
        settings: PollerSettings,
    ) -> AppResult<Self> {
        if !ctx.aggregator.is_registered(&affiliate.id) {
            return Err(AppError::Validation(format!(
                "Affiliate '{}' is not registered with the stats aggregator",
                affiliate.id
            )));
        }

        let replay = settings.replay_history.then(ReplayProgress::default);
        let status = PollerStatus {
            affiliate: affiliate.id.clone(),
            name: affiliate.name.clone(),
            backfill_complete: replay.is_none(),
            ..Default::default()
        };

        Ok(Self {
            affiliate,
            ctx,
            settings,
            cycle: tokio::sync::Mutex::new(CycleState { replay }),
            status: RwLock::new(status),
        })
    }

    pub fn affiliate(&self) -> &AffiliateConfig {
        &self.affiliate
    }

    pub fn status(&self) -> PollerStatus {
        self.status.read().clone()
    }

    pub fn backfill_complete(&self) -> bool {
        self.status.read().backfill_complete
    }

    /// Run one cycle unless one is already in flight for this affiliate.
    ///
    /// `cancel` is checked between pages; the page in flight is always
    /// committed first.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> AppResult<CycleOutcome> {
        let Ok(mut state) = self.cycle.try_lock() else {
            tracing::debug!(affiliate = %self.affiliate.id, "Previous cycle still running, skipping");
            self.ctx.metrics.record_cycle(&self.affiliate.id, "skipped");
            return Ok(CycleOutcome::Skipped);
        };

        let mut report = CycleReport::default();
        let result = self.run_locked(&mut state, cancel, &mut report).await;
        self.finish_cycle(&result, &report);

        result.map(|_| CycleOutcome::Completed(report))
    }

    async fn run_locked(
        &self,
        state: &mut CycleState,
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) -> AppResult<()> {
        if let Some(progress) = state.replay.as_mut() {
            let result = self.replay(progress, cancel, report).await;
            if progress.finished {
                state.replay = None;
                self.status.write().backfill_complete = true;
                tracing::info!(
                    affiliate = %self.affiliate.id,
                    replayed = report.replayed,
                    "History replay complete"
                );
                self.refresh_title(true).await;
            }
            result?;

            if state.replay.is_some() {
                // cancelled mid-replay
                return Ok(());
            }
        }

        self.drain(cancel, report).await?;

        if report.transactions > 0 {
            self.refresh_title(false).await;
        }
        Ok(())
    }

    /// Page forward from the committed cursor
    async fn drain(&self, cancel: &CancellationToken, report: &mut CycleReport) -> AppResult<()> {
        let mut cursor = self.ctx.cursors.get(&self.affiliate.id).await?;
        let mut pages = 0;

        loop {
            let page = self.fetch(&cursor).await?;
            let Some(last) = page.last_cursor().cloned() else {
                break;
            };

            let mut fresh = 0;
            for tx in after(&page.transactions, &cursor) {
                if let Some((fee, stats)) = self.record(tx) {
                    self.notify(tx, fee, &stats).await;
                }
                fresh += 1;
            }

            self.commit(&last).await?;
            report.pages += 1;
            report.transactions += fresh;
            pages += 1;
            cursor = last;

            if page.fetched() < self.settings.page_size {
                break;
            }
            if pages >= self.settings.max_pages_per_cycle {
                tracing::debug!(
                    affiliate = %self.affiliate.id,
                    pages,
                    "Page budget reached, resuming next cycle"
                );
                break;
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        Ok(())
    }

    /// Replay history into stats and the log without notifying, up to and
    /// including the committed cursor. Transactions past it are handled like
    /// a normal page.
    async fn replay(
        &self,
        progress: &mut ReplayProgress,
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) -> AppResult<()> {
        let committed = match &progress.committed {
            Some(c) => c.clone(),
            None => {
                let c = self.ctx.cursors.get(&self.affiliate.id).await?;
                progress.committed = Some(c.clone());
                c
            }
        };

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let page = self.fetch(&progress.position).await?;
            let Some(last) = page.last_cursor().cloned() else {
                return self.finish_replay_at_head(progress, &committed).await;
            };

            let split = if committed.is_empty() {
                None
            } else {
                page.split_at_cursor(&committed)
            };

            let Some((seen, fresh)) = split else {
                for tx in after(&page.transactions, &progress.position) {
                    self.record(tx);
                    report.replayed += 1;
                }
                report.pages += 1;
                progress.position = last;

                if page.fetched() < self.settings.page_size {
                    return self.finish_replay_at_head(progress, &committed).await;
                }
                continue;
            };

            for tx in after(seen, &progress.position) {
                self.record(tx);
                report.replayed += 1;
            }
            report.pages += 1;
            progress.position = committed.clone();
            progress.finished = true;

            for tx in fresh {
                if let Some((fee, stats)) = self.record(tx) {
                    self.notify(tx, fee, &stats).await;
                }
            }
            report.transactions += fresh.len();
            if last != committed {
                self.commit(&last).await?;
            }
            return Ok(());
        }
    }

    /// Replay reached the newest transaction without meeting the committed
    /// cursor. Everything replayed counts as seen.
    async fn finish_replay_at_head(
        &self,
        progress: &mut ReplayProgress,
        committed: &Cursor,
    ) -> AppResult<()> {
        if progress.position.is_empty() || progress.position == *committed {
            progress.finished = true;
            return Ok(());
        }

        if !committed.is_empty() {
            tracing::warn!(
                affiliate = %self.affiliate.id,
                committed = %committed,
                head = %progress.position,
                "Committed cursor not found in history, advancing to head"
            );
        }
        // a failed commit leaves the replay open; the next cycle retries it
        self.commit(&progress.position).await?;
        progress.finished = true;
        Ok(())
    }

    async fn fetch(&self, cursor: &Cursor) -> AppResult<Page> {
        let started = Instant::now();
        let result = self
            .ctx
            .source
            .fetch_page(&self.affiliate.id, cursor, self.settings.page_size)
            .await;
        self.ctx
            .metrics
            .fetch_latency
            .observe(started.elapsed().as_secs_f64() * 1000.0);

        if let Ok(page) = &result {
            tracing::debug!(
                affiliate = %self.affiliate.id,
                cursor = %cursor,
                fetched = page.fetched(),
                settled = page.transactions.len(),
                "Fetched transaction page"
            );
        }
        result
    }

    /// Aggregate and log one transaction
    fn record(&self, tx: &Transaction) -> Option<(f64, StatsSnapshot)> {
        let fee = fee_usd(tx);
        let Some(stats) = self
            .ctx
            .aggregator
            .record(&self.affiliate.id, fee, tx.amount_in_usd)
        else {
            tracing::warn!(affiliate = %self.affiliate.id, "No live stats for affiliate");
            return None;
        };

        let labels = &self.ctx.labels;
        self.ctx.log.append(LogEntry {
            affiliate_id: self.affiliate.id.clone(),
            reseller: self.affiliate.name.clone(),
            tx: tx.clone(),
            fee_usd: fee,
            token_in: labels.asset_label(&tx.origin_asset),
            chain_in: labels.chain_label(&tx.origin_asset),
            token_out: labels.asset_label(&tx.destination_asset),
            chain_out: labels.chain_label(&tx.destination_asset),
        });

        self.ctx.metrics.log_buffer_len.set(self.ctx.log.len() as i64);
        self.ctx
            .metrics
            .transactions_ingested
            .with_label_values(&[self.affiliate.id.as_str()])
            .inc();
        self.status.write().ingested += 1;

        Some((fee, stats))
    }

    async fn notify(&self, tx: &Transaction, fee: f64, stats: &StatsSnapshot) {
        if let Err(e) = self
            .ctx
            .notifier
            .post_transaction(&self.affiliate.id, tx, fee, stats)
            .await
        {
            self.ctx.metrics.notification_failures.inc();
            tracing::warn!(
                affiliate = %self.affiliate.id,
                deposit_address = %tx.deposit_address,
                error = %e,
                "Failed to post swap card"
            );
        }
    }

    async fn commit(&self, cursor: &Cursor) -> AppResult<()> {
        if let Err(e) = self.ctx.cursors.advance(&self.affiliate.id, cursor).await {
            self.ctx.metrics.cursor_advance_failures.inc();
            tracing::warn!(
                affiliate = %self.affiliate.id,
                cursor = %cursor,
                error = %e,
                "Cursor advance failed, page will be fetched again"
            );
            return Err(e);
        }
        tracing::debug!(affiliate = %self.affiliate.id, cursor = %cursor, "Cursor committed");
        Ok(())
    }

    /// Push the affiliate's running total into its thread title
    pub async fn refresh_title(&self, force: bool) {
        let total = self.ctx.aggregator.snapshot(&self.affiliate.id).fee_usd;
        if let Err(e) = self
            .ctx
            .notifier
            .update_thread_title(&self.affiliate.id, total, force)
            .await
        {
            self.ctx.metrics.notification_failures.inc();
            tracing::warn!(affiliate = %self.affiliate.id, error = %e, "Failed to update thread title");
        }
    }

    fn finish_cycle(&self, result: &AppResult<()>, report: &CycleReport) {
        let mut status = self.status.write();
        match result {
            Ok(()) => {
                status.last_success = Some(Utc::now());
                status.last_error = None;
                status.consecutive_failures = 0;
                drop(status);

                let outcome = if report.is_idle() { "idle" } else { "ok" };
                self.ctx.metrics.record_cycle(&self.affiliate.id, outcome);
                if !report.is_idle() {
                    tracing::info!(
                        affiliate = %self.affiliate.id,
                        pages = report.pages,
                        transactions = report.transactions,
                        replayed = report.replayed,
                        "Poll cycle complete"
                    );
                }
            }
            Err(e) => {
                status.last_error = Some(e.to_string());
                status.consecutive_failures += 1;
                let failures = status.consecutive_failures;
                drop(status);

                let outcome = if e.is_transient() { "error" } else { "fatal" };
                self.ctx.metrics.record_cycle(&self.affiliate.id, outcome);
                if e.is_transient() {
                    tracing::warn!(
                        affiliate = %self.affiliate.id,
                        error = %e,
                        consecutive_failures = failures,
                        "Poll cycle failed, retrying next tick"
                    );
                } else {
                    tracing::error!(
                        affiliate = %self.affiliate.id,
                        error = %e,
                        consecutive_failures = failures,
                        "Poll cycle failed with a non-transient error"
                    );
                }
            }
        }
    }
}

/// Transactions on a page other than the one at `cursor`, which some feeds
/// repeat at the head of the next page
fn after<'a>(
    transactions: &'a [Transaction],
    cursor: &'a Cursor,
) -> impl Iterator<Item = &'a Transaction> + 'a {
    transactions
        .iter()
        .filter(move |tx| cursor.is_empty() || tx.cursor() != *cursor)
}

/// Start the polling loop for one affiliate
///
/// Runs a cycle immediately, then every `interval_secs`. A tick that fires
/// while a cycle is still running is skipped.
pub async fn start_polling_task(
    poller: Arc<AffiliatePoller>,
    interval_secs: u64,
    cancel_token: CancellationToken,
) {
    tracing::info!(
        affiliate = %poller.affiliate().id,
        interval_secs,
        "Starting affiliate polling task"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::info!(affiliate = %poller.affiliate().id, "Polling task shutting down");
                break;
            }
            _ = interval.tick() => {
                // errors are recorded in the poller status
                let _ = poller.run_cycle(&cancel_token).await;
            }
        }
    }
}

/// Periodically rewrite the main chat description and every thread title.
///
/// Waits until every poller has finished its history replay so a partial
/// total never consumes the description placeholder.
pub async fn start_summary_task(
    pollers: Vec<Arc<AffiliatePoller>>,
    ctx: MonitorContext,
    interval_secs: u64,
    cancel_token: CancellationToken,
) {
    if !ctx.notifier.is_enabled() {
        tracing::info!("Notifications disabled, summary task not started");
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::info!("Summary task shutting down");
                break;
            }
            _ = interval.tick() => {
                if !pollers.iter().all(|p| p.backfill_complete()) {
                    tracing::debug!("History replay still running, deferring summary");
                    continue;
                }

                let total = ctx.aggregator.total_fee_usd();
                if let Err(e) = ctx.notifier.update_aggregate_description(total).await {
                    ctx.metrics.notification_failures.inc();
                    tracing::warn!(error = %e, "Failed to update chat description");
                }
                for poller in &pollers {
                    poller.refresh_title(false).await;
                }
            }
        }
    }
}
