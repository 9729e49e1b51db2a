//! Explorer API client - the transaction feed for affiliate monitoring
//!
//! Read-only, bearer-authenticated when a token is configured. No retries:
//! the poller owns retry policy.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::config::ExplorerConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Cursor, Transaction};

/// Transactions endpoint, relative to the base URL
const TRANSACTIONS_PATH: &str = "/v0/transactions";

/// One page of the feed.
///
/// `transactions` holds only settled swaps, but `cursors` keeps the position
/// of every record the feed returned, so paging can step over a run of
/// non-success records instead of stalling on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub transactions: Vec<Transaction>,
    pub cursors: Vec<Cursor>,
}

impl Page {
    /// Build a page from raw feed records, keeping only settled ones
    pub fn from_records(records: Vec<Transaction>) -> Self {
        let cursors = records.iter().map(Transaction::cursor).collect();
        let transactions = records.into_iter().filter(Transaction::is_success).collect();
        Self {
            transactions,
            cursors,
        }
    }

    /// Records the feed returned, settled or not
    pub fn fetched(&self) -> usize {
        self.cursors.len()
    }

    /// Position of the last record on the page, `None` for an empty page
    pub fn last_cursor(&self) -> Option<&Cursor> {
        self.cursors.last()
    }

    /// Split the settled transactions around `cursor`'s record: those up to
    /// and including it, and those after it. `None` when the page does not
    /// contain `cursor`.
    pub fn split_at_cursor(&self, cursor: &Cursor) -> Option<(&[Transaction], &[Transaction])> {
        let i = self.cursors.iter().position(|c| c == cursor)?;
        let upto = &self.cursors[..=i];
        let n = self
            .transactions
            .iter()
            .take_while(|tx| upto.contains(&tx.cursor()))
            .count();
        Some(self.transactions.split_at(n))
    }
}

/// Source of settled transactions for an affiliate
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Fetch up to `page_size` records strictly after `cursor`, in pagination
    /// order. An empty cursor requests the oldest page.
    async fn fetch_page(
        &self,
        affiliate_id: &str,
        cursor: &Cursor,
        page_size: usize,
    ) -> AppResult<Page>;
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default, deserialize_with = "crate::models::null_as_default")]
    transactions: Vec<Transaction>,
}

/// HTTP client for the explorer API
pub struct ExplorerClient {
    client: Client,
    base_url: String,
    jwt: Option<SecretString>,
}

impl ExplorerClient {
    pub fn new(config: &ExplorerConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let jwt = config
            .jwt
            .clone()
            .filter(|t| !t.expose_secret().is_empty());

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            jwt,
        })
    }

    pub fn has_credential(&self) -> bool {
        self.jwt.is_some()
    }

    /// Query string for one page request
    fn page_query(affiliate_id: &str, cursor: &Cursor, page_size: usize) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("affiliate", affiliate_id.to_string()),
            ("statuses", "SUCCESS".to_string()),
            ("numberOfTransactions", page_size.to_string()),
            ("direction", "next".to_string()),
        ];
        if !cursor.deposit_address.is_empty() {
            query.push(("lastDepositAddress", cursor.deposit_address.clone()));
            if !cursor.deposit_memo.is_empty() {
                query.push(("lastDepositMemo", cursor.deposit_memo.clone()));
            }
        }
        query
    }
}

#[async_trait]
impl TransactionSource for ExplorerClient {
    async fn fetch_page(
        &self,
        affiliate_id: &str,
        cursor: &Cursor,
        page_size: usize,
    ) -> AppResult<Page> {
        let url = format!("{}{}", self.base_url, TRANSACTIONS_PATH);

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&Self::page_query(affiliate_id, cursor, page_size));
        if let Some(jwt) = &self.jwt {
            request = request.bearer_auth(jwt.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(AppError::upstream(
                status.as_u16(),
                &String::from_utf8_lossy(&body),
            ));
        }

        let page: PageResponse =
            serde_json::from_slice(&body).map_err(|e| AppError::malformed(body.len(), &e))?;

        let page = Page::from_records(page.transactions);
        let dropped = page.fetched() - page.transactions.len();
        if dropped > 0 {
            tracing::warn!(
                affiliate = %affiliate_id,
                dropped,
                "Explorer returned non-success transactions, dropping them"
            );
        }

        Ok(page)
    }
}
