//! Bounded in-memory transaction log
//!
//! Fixed-capacity ring of recently observed transactions, oldest evicted
//! first. The poller appends, HTTP readers take filtered snapshots; a
//! read-write lock keeps both short (entries are `Arc`ed, so a snapshot
//! copies pointers, not transactions).

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::models::Transaction;

/// One observed transaction annotated with its affiliate, fee and labels
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub affiliate_id: String,
    /// Affiliate display name
    pub reseller: String,
    pub tx: Transaction,
    pub fee_usd: f64,
    pub token_in: String,
    pub chain_in: String,
    pub token_out: String,
    pub chain_out: String,
}

/// Bounded, insertion-ordered log
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    entries: RwLock<VecDeque<Arc<LogEntry>>>,
}

impl LogBuffer {
    /// Create an empty log. A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an entry, evicting the oldest when full
    pub fn append(&self, entry: LogEntry) {
        let entry = Arc::new(entry);
        let mut entries = self.entries.write();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Newest-first entries matching `predicate`, at most `limit` of them
    pub fn snapshot<F>(&self, limit: usize, predicate: F) -> Vec<Arc<LogEntry>>
    where
        F: Fn(&LogEntry) -> bool,
    {
        let entries = self.entries.read();
        entries
            .iter()
            .rev()
            .filter(|e| predicate(&***e))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// Text and reseller filter applied by the reporting surface
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Lowercased free-text query
    query: Option<String>,
    /// Reseller display name, compared case-insensitively
    reseller: Option<String>,
}

impl LogFilter {
    pub fn new(query: Option<&str>, reseller: Option<&str>) -> Self {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        let reseller = reseller
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        Self { query, reseller }
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(reseller) = &self.reseller {
            if !entry.reseller.eq_ignore_ascii_case(reseller)
                && !entry.affiliate_id.eq_ignore_ascii_case(reseller)
            {
                return false;
            }
        }

        let Some(q) = &self.query else {
            return true;
        };

        let tx = &entry.tx;
        let fields = [
            entry.reseller.as_str(),
            tx.recipient.as_str(),
            tx.deposit_address.as_str(),
            entry.token_in.as_str(),
            entry.token_out.as_str(),
            entry.chain_in.as_str(),
            entry.chain_out.as_str(),
        ];

        fields.iter().any(|f| contains_ci(f, q)) || tx.all_tx_hashes().any(|h| contains_ci(h, q))
    }
}

fn contains_ci(haystack: &str, lowered_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowered_needle)
}
