//! Live per-affiliate statistics
//!
//! Running totals (fee revenue, volume, swap count) for every registered
//! affiliate. The affiliate map is built once at startup and never changes,
//! so lookups take no lock; each affiliate's counters sit behind their own
//! mutex so the pollers of different affiliates never contend.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::AffiliateConfig;

/// Point-in-time view of one affiliate's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub fee_usd: f64,
    pub volume_usd: f64,
    pub swap_count: u64,
}

/// Counters for a single affiliate
#[derive(Debug, Default)]
pub struct LiveStats {
    inner: Mutex<StatsSnapshot>,
}

impl LiveStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one swap; all three counters move together
    pub fn record(&self, fee_usd: f64, volume_usd: f64) -> StatsSnapshot {
        let mut stats = self.inner.lock();
        stats.fee_usd += fee_usd;
        stats.volume_usd += volume_usd;
        stats.swap_count += 1;
        *stats
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.lock()
    }
}

/// Stats row for one affiliate, in registration order
#[derive(Debug, Clone, Serialize)]
pub struct AffiliateStats {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

/// Registry of live stats keyed by affiliate id
#[derive(Debug)]
pub struct StatsAggregator {
    /// (id, display name) in registration order
    order: Vec<(String, String)>,
    stats: HashMap<String, LiveStats>,
}

impl StatsAggregator {
    /// Create zeroed counters for every registered affiliate
    pub fn new(affiliates: &[AffiliateConfig]) -> Self {
        let order: Vec<(String, String)> = affiliates
            .iter()
            .map(|a| (a.id.clone(), a.name.clone()))
            .collect();
        let stats = affiliates
            .iter()
            .map(|a| (a.id.clone(), LiveStats::new()))
            .collect();
        Self { order, stats }
    }

    /// Record one swap. Returns the post-update snapshot, or `None` for an
    /// affiliate that was never registered.
    pub fn record(&self, affiliate_id: &str, fee_usd: f64, volume_usd: f64) -> Option<StatsSnapshot> {
        self.stats
            .get(affiliate_id)
            .map(|s| s.record(fee_usd, volume_usd))
    }

    /// Consistent (fee, volume, count) triple; zero for unknown affiliates
    pub fn snapshot(&self, affiliate_id: &str) -> StatsSnapshot {
        self.stats
            .get(affiliate_id)
            .map(LiveStats::snapshot)
            .unwrap_or_default()
    }

    /// Grand total of fee revenue across all affiliates
    pub fn total_fee_usd(&self) -> f64 {
        self.order
            .iter()
            .filter_map(|(id, _)| self.stats.get(id))
            .map(|s| s.snapshot().fee_usd)
            .sum()
    }

    /// Per-affiliate stats in registration order
    pub fn per_affiliate(&self) -> Vec<AffiliateStats> {
        self.order
            .iter()
            .map(|(id, name)| AffiliateStats {
                id: id.clone(),
                name: name.clone(),
                stats: self.snapshot(id),
            })
            .collect()
    }

    pub fn is_registered(&self, affiliate_id: &str) -> bool {
        self.stats.contains_key(affiliate_id)
    }
}
