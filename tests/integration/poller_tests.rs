//! Poller Integration Tests
//!
//! Drives `AffiliatePoller` against in-memory fixtures:
//! - Aggregation, logging, notification and cursor commit per page
//! - Backlog drain within one cycle
//! - Fetch and persistence failures
//! - Startup history replay
//! - Non-success records and feeds that repeat the cursor's record
//! - Single-flight cycles and task shutdown

use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use reseller_monitor::monitoring::{
    start_polling_task, start_summary_task, AffiliatePoller, CursorStore, CycleOutcome,
    CycleReport, MemoryCursorStore, Page, PollerSettings, StatsSnapshot, TransactionSource,
};
use reseller_monitor::{AppError, AppResult, Cursor};

use crate::common::{
    affiliate, context, failed_swap, swap, swaps, FlakyCursorStore, RecordingSink, VecSource,
};

const EAGLE_THREAD: i64 = 77;

fn settings(page_size: usize, replay_history: bool) -> PollerSettings {
    PollerSettings {
        page_size,
        max_pages_per_cycle: 50,
        replay_history,
    }
}

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::Skipped => panic!("cycle was skipped"),
    }
}

#[tokio::test]
async fn test_eagle_scenario() {
    let eagle = affiliate("eagle", "EagleSwap", Some(EAGLE_THREAD));
    let source = Arc::new(VecSource::new());
    source.push("eagle", vec![swap(1, 100.0, &[30, 20])]);
    let cursors = Arc::new(MemoryCursorStore::new());
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(
        &[eagle.clone()],
        source.clone(),
        cursors.clone(),
        Some(sink.clone()),
    );

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(100, false)).unwrap();
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());

    assert_eq!(report.transactions, 1);
    assert_eq!(
        ctx.aggregator.snapshot("eagle"),
        StatsSnapshot {
            fee_usd: 0.50,
            volume_usd: 100.0,
            swap_count: 1
        }
    );

    let log = ctx.log.snapshot(10, |_| true);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].reseller, "EagleSwap");
    assert_eq!(log[0].fee_usd, 0.50);
    assert_eq!(log[0].chain_out, "TRON");

    let messages = sink.messages.lock().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, Some(EAGLE_THREAD));
    assert!(messages[0].1.contains("EAGLESWAP"));
    assert!(messages[0].1.contains("$0.50 PROFIT"));

    let titles = sink.titles.lock().clone();
    assert_eq!(titles, vec![(EAGLE_THREAD, "$0.50 Profit · EagleSwap".to_string())]);

    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0001", ""));
    assert_eq!(poller.status().ingested, 1);
    assert!(poller.status().last_success.is_some());
}

#[tokio::test]
async fn test_full_pages_drain_in_one_cycle() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(25));
    let cursors = Arc::new(MemoryCursorStore::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap();
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());

    assert_eq!(report.pages, 3);
    assert_eq!(report.transactions, 25);
    // 10 + 10 + 5; the short page ends the cycle without another request
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 25);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0025", ""));

    // order is preserved: newest log entry is the last transaction
    let newest = ctx.log.snapshot(1, |_| true);
    assert_eq!(newest[0].tx.deposit_address, "dep-0025");
}

#[tokio::test]
async fn test_page_budget_yields_and_resumes() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(25));
    let cursors = Arc::new(MemoryCursorStore::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let settings = PollerSettings {
        page_size: 10,
        max_pages_per_cycle: 2,
        replay_history: false,
    };
    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings).unwrap();
    let cancel = CancellationToken::new();

    let first = completed(poller.run_cycle(&cancel).await.unwrap());
    assert_eq!(first.transactions, 20);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0020", ""));

    let second = completed(poller.run_cycle(&cancel).await.unwrap());
    assert_eq!(second.transactions, 5);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 25);
}

#[tokio::test]
async fn test_fetch_error_is_confined_to_one_affiliate() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let broken = affiliate("broken", "Broken", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(3));
    source.push("broken", swaps(4));
    source.set_failing("broken", true);
    let cursors = Arc::new(MemoryCursorStore::new());
    let ctx = context(
        &[eagle.clone(), broken.clone()],
        source.clone(),
        cursors.clone(),
        None,
    );

    let eagle_poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap();
    let broken_poller = AffiliatePoller::new(broken, ctx.clone(), settings(10, false)).unwrap();
    let cancel = CancellationToken::new();

    assert!(broken_poller.run_cycle(&cancel).await.is_err());
    assert!(eagle_poller.run_cycle(&cancel).await.is_ok());

    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 3);
    assert_eq!(ctx.aggregator.snapshot("broken").swap_count, 0);
    assert!(cursors.get("broken").await.unwrap().is_empty());

    let status = broken_poller.status();
    assert_eq!(status.consecutive_failures, 1);
    assert!(status.last_error.unwrap().contains("503"));

    // feed recovers: nothing was lost
    source.set_failing("broken", false);
    let report = completed(broken_poller.run_cycle(&cancel).await.unwrap());
    assert_eq!(report.transactions, 4);
    assert_eq!(broken_poller.status().consecutive_failures, 0);
    assert!(broken_poller.status().last_error.is_none());
}

#[tokio::test]
async fn test_failed_cursor_advance_reaggregates_page() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(5));
    let cursors = Arc::new(FlakyCursorStore::new());
    cursors.set_fail_advance(true);
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap();
    let cancel = CancellationToken::new();

    // page aggregated and logged, commit fails
    assert!(poller.run_cycle(&cancel).await.is_err());
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 5);
    assert_eq!(ctx.log.len(), 5);
    assert!(cursors.get("eagle").await.unwrap().is_empty());
    assert_eq!(ctx.metrics.cursor_advance_failures.get(), 1);

    // the next run starts from the old cursor and counts the same five
    // again: at-least-once, nothing dropped
    cursors.set_fail_advance(false);
    let report = completed(poller.run_cycle(&cancel).await.unwrap());
    assert_eq!(report.transactions, 5);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 10);
    assert_eq!(ctx.log.len(), 10);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0005", ""));
}

#[tokio::test]
async fn test_committed_cursor_is_not_reemitted() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(4));
    let cursors = Arc::new(MemoryCursorStore::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap();
    let cancel = CancellationToken::new();
    completed(poller.run_cycle(&cancel).await.unwrap());

    let again = completed(poller.run_cycle(&cancel).await.unwrap());
    assert!(again.is_idle());

    // a feed that repeats the cursor's own transaction still adds nothing
    source.set_inclusive(true);
    let inclusive = completed(poller.run_cycle(&cancel).await.unwrap());
    assert_eq!(inclusive.transactions, 0);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 4);

    // new activity after the cursor is picked up
    source.set_inclusive(false);
    source.push("eagle", vec![swap(5, 200.0, &[25])]);
    let fresh = completed(poller.run_cycle(&cancel).await.unwrap());
    assert_eq!(fresh.transactions, 1);
    let snap = ctx.aggregator.snapshot("eagle");
    assert_eq!(snap.swap_count, 5);
    assert_eq!(snap.volume_usd, 600.0);
}

#[tokio::test]
async fn test_notification_failure_does_not_block_commit() {
    let eagle = affiliate("eagle", "EagleSwap", Some(EAGLE_THREAD));
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(3));
    let cursors = Arc::new(MemoryCursorStore::new());
    let sink = Arc::new(RecordingSink::new());
    sink.set_failing(true);
    let ctx = context(
        &[eagle.clone()],
        source.clone(),
        cursors.clone(),
        Some(sink.clone()),
    );

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap();
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());

    assert_eq!(report.transactions, 3);
    assert_eq!(sink.message_count(), 0);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 3);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0003", ""));
    // three cards and one title
    assert_eq!(ctx.metrics.notification_failures.get(), 4);
    assert_eq!(poller.status().consecutive_failures, 0);
}

#[tokio::test]
async fn test_replay_rebuilds_stats_then_notifies_new() {
    let eagle = affiliate("eagle", "EagleSwap", Some(EAGLE_THREAD));
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(5));
    let cursors = Arc::new(MemoryCursorStore::new());
    cursors
        .advance("eagle", &Cursor::new("dep-0003", ""))
        .await
        .unwrap();
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(
        &[eagle.clone()],
        source.clone(),
        cursors.clone(),
        Some(sink.clone()),
    );

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, true)).unwrap();
    assert!(!poller.backfill_complete());

    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());
    assert_eq!(report.replayed, 3);
    assert_eq!(report.transactions, 2);
    assert!(poller.backfill_complete());

    // all five counted, only the two after the committed cursor posted
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 5);
    assert_eq!(ctx.log.len(), 5);
    let messages = sink.messages.lock().clone();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].1.contains("#4"));
    assert!(messages[1].1.contains("#5"));
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0005", ""));

    // replay finished: later cycles are plain drains
    let next = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());
    assert!(next.is_idle());
}

#[tokio::test]
async fn test_first_run_replay_is_silent() {
    let eagle = affiliate("eagle", "EagleSwap", Some(EAGLE_THREAD));
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(12));
    let cursors = Arc::new(MemoryCursorStore::new());
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(
        &[eagle.clone()],
        source.clone(),
        cursors.clone(),
        Some(sink.clone()),
    );

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(5, true)).unwrap();
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());

    assert_eq!(report.replayed, 12);
    assert_eq!(report.transactions, 0);
    assert_eq!(sink.message_count(), 0);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 12);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0012", ""));
    // forced title refresh once replay completes
    assert_eq!(sink.titles.lock().len(), 1);
}

#[tokio::test]
async fn test_replay_resumes_after_fetch_error() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(6));
    let cursors = Arc::new(MemoryCursorStore::new());
    cursors
        .advance("eagle", &Cursor::new("dep-0006", ""))
        .await
        .unwrap();
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(2, true)).unwrap();
    source.set_failing("eagle", true);
    assert!(poller.run_cycle(&CancellationToken::new()).await.is_err());
    assert!(!poller.backfill_complete());

    source.set_failing("eagle", false);
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());
    assert_eq!(report.replayed, 6);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 6);
}

#[tokio::test]
async fn test_missing_committed_cursor_advances_to_head() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(3));
    let cursors = Arc::new(MemoryCursorStore::new());
    cursors
        .advance("eagle", &Cursor::new("vanished", "memo"))
        .await
        .unwrap();
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, true)).unwrap();
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());

    assert_eq!(report.replayed, 3);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0003", ""));
}

#[tokio::test]
async fn test_overlapping_cycle_is_skipped() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(2));
    source.set_delay(Duration::from_millis(300));
    let cursors = Arc::new(MemoryCursorStore::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = Arc::new(AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap());
    let cancel = CancellationToken::new();

    let first = {
        let poller = poller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run_cycle(&cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = poller.run_cycle(&cancel).await.unwrap();
    assert_eq!(second, CycleOutcome::Skipped);

    let first = completed(first.await.unwrap().unwrap());
    assert_eq!(first.transactions, 2);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 2);
}

#[tokio::test]
async fn test_unregistered_affiliate_is_rejected() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let ctx = context(
        &[eagle],
        Arc::new(VecSource::new()),
        Arc::new(MemoryCursorStore::new()),
        None,
    );
    let stranger = affiliate("stranger", "Stranger", None);
    assert!(AffiliatePoller::new(stranger, ctx, settings(10, false)).is_err());
}

#[tokio::test]
async fn test_polling_task_stops_on_cancel() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(3));
    let cursors = Arc::new(MemoryCursorStore::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = Arc::new(AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(start_polling_task(poller.clone(), 3600, cancel.clone()));

    // first tick fires immediately
    for _ in 0..50 {
        if poller.status().last_success.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 3);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("polling task did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_summary_waits_for_replay_then_updates_description() {
    let eagle = affiliate("eagle", "EagleSwap", Some(EAGLE_THREAD));
    let source = Arc::new(VecSource::new());
    source.push("eagle", vec![swap(1, 100.0, &[30, 20])]);
    let cursors = Arc::new(MemoryCursorStore::new());
    let sink = Arc::new(RecordingSink::with_description("Resellers earned $ in fees"));
    let ctx = context(
        &[eagle.clone()],
        source.clone(),
        cursors.clone(),
        Some(sink.clone()),
    );

    let poller = Arc::new(AffiliatePoller::new(eagle, ctx.clone(), settings(10, true)).unwrap());
    let cancel = CancellationToken::new();

    // replay not done: the immediate first tick must leave the placeholder
    let task = tokio::spawn(start_summary_task(
        vec![poller.clone()],
        ctx.clone(),
        3600,
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        sink.description.lock().as_deref(),
        Some("Resellers earned $ in fees")
    );
    cancel.cancel();
    task.await.unwrap();

    completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());
    assert!(poller.backfill_complete());

    let cancel = CancellationToken::new();
    let task = tokio::spawn(start_summary_task(
        vec![poller.clone()],
        ctx.clone(),
        3600,
        cancel.clone(),
    ));
    for _ in 0..50 {
        if sink.description.lock().as_deref() != Some("Resellers earned $ in fees") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        sink.description.lock().as_deref(),
        Some("Resellers earned $0.50 in fees")
    );
    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_replay_with_inclusive_feed_counts_each_swap_once() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(25));
    source.set_inclusive(true);
    let cursors = Arc::new(MemoryCursorStore::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, true)).unwrap();
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());

    assert_eq!(report.replayed, 25);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 25);
    assert_eq!(ctx.log.len(), 25);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0025", ""));
}

#[tokio::test]
async fn test_replay_with_inclusive_feed_stops_at_committed_cursor() {
    let eagle = affiliate("eagle", "EagleSwap", Some(EAGLE_THREAD));
    let source = Arc::new(VecSource::new());
    source.push("eagle", swaps(25));
    source.set_inclusive(true);
    let cursors = Arc::new(MemoryCursorStore::new());
    cursors
        .advance("eagle", &Cursor::new("dep-0012", ""))
        .await
        .unwrap();
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), Some(sink.clone()));

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, true)).unwrap();
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());

    assert_eq!(report.replayed, 12);
    assert_eq!(report.transactions, 13);
    assert_eq!(sink.message_count(), 13);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 25);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0025", ""));
}

#[tokio::test]
async fn test_page_of_failed_records_advances_cursor() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    source.push("eagle", (1..=5).map(failed_swap).collect());
    let cursors = Arc::new(MemoryCursorStore::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap();
    let cancel = CancellationToken::new();
    let report = completed(poller.run_cycle(&cancel).await.unwrap());

    assert_eq!(report.transactions, 0);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 0);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0005", ""));

    // the affiliate keeps moving once settled swaps show up
    source.push("eagle", vec![swap(6, 100.0, &[30, 20])]);
    let report = completed(poller.run_cycle(&cancel).await.unwrap());
    assert_eq!(report.transactions, 1);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0006", ""));
}

#[tokio::test]
async fn test_full_page_with_dropped_records_keeps_draining() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let source = Arc::new(VecSource::new());
    let mut history: Vec<_> = (1..=10)
        .map(|n| if n % 5 == 0 { failed_swap(n) } else { swap(n, 100.0, &[30, 20]) })
        .collect();
    history.extend((11..=12).map(|n| swap(n, 100.0, &[30, 20])));
    source.push("eagle", history);
    let cursors = Arc::new(MemoryCursorStore::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), None);

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap();
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());

    assert_eq!(report.pages, 2);
    assert_eq!(report.transactions, 10);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0012", ""));
}

#[tokio::test]
async fn test_replay_finds_committed_cursor_on_failed_record() {
    let eagle = affiliate("eagle", "EagleSwap", Some(EAGLE_THREAD));
    let source = Arc::new(VecSource::new());
    let mut history = swaps(5);
    history.extend((6..=7).map(failed_swap));
    history.push(swap(8, 100.0, &[30, 20]));
    source.push("eagle", history);
    let cursors = Arc::new(MemoryCursorStore::new());
    cursors
        .advance("eagle", &Cursor::new("dep-0007", ""))
        .await
        .unwrap();
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(&[eagle.clone()], source.clone(), cursors.clone(), Some(sink.clone()));

    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, true)).unwrap();
    let report = completed(poller.run_cycle(&CancellationToken::new()).await.unwrap());

    assert_eq!(report.replayed, 5);
    assert_eq!(report.transactions, 1);
    assert_eq!(sink.message_count(), 1);
    assert_eq!(ctx.aggregator.snapshot("eagle").swap_count, 6);
    assert_eq!(cursors.get("eagle").await.unwrap(), Cursor::new("dep-0008", ""));
}

struct RejectingSource;

#[async_trait]
impl TransactionSource for RejectingSource {
    async fn fetch_page(&self, _: &str, _: &Cursor, _: usize) -> AppResult<Page> {
        Err(AppError::Validation("affiliate unknown to the feed".to_string()))
    }
}

#[tokio::test]
async fn test_non_transient_failure_is_classified_fatal() {
    let eagle = affiliate("eagle", "EagleSwap", None);
    let failing = Arc::new(VecSource::new());
    failing.set_failing("eagle", true);

    let ctx = context(
        &[eagle.clone()],
        Arc::new(RejectingSource),
        Arc::new(MemoryCursorStore::new()),
        None,
    );
    let poller = AffiliatePoller::new(eagle.clone(), ctx.clone(), settings(10, false)).unwrap();
    assert!(poller.run_cycle(&CancellationToken::new()).await.is_err());

    let cycles = &ctx.metrics.poll_cycles;
    assert_eq!(cycles.with_label_values(&["eagle", "fatal"]).get(), 1);
    assert_eq!(cycles.with_label_values(&["eagle", "error"]).get(), 0);

    // an upstream outage stays transient
    let ctx = context(&[eagle.clone()], failing, Arc::new(MemoryCursorStore::new()), None);
    let poller = AffiliatePoller::new(eagle, ctx.clone(), settings(10, false)).unwrap();
    assert!(poller.run_cycle(&CancellationToken::new()).await.is_err());
    assert_eq!(ctx.metrics.poll_cycles.with_label_values(&["eagle", "error"]).get(), 1);
    assert_eq!(poller.status().consecutive_failures, 1);
}
