//! Per-affiliate pagination cursors
//!
//! `advance` is durable before it returns. The poller only advances after a
//! page has been aggregated and logged, so a crash mid-page re-fetches that
//! page on restart (at-least-once) and never skips one.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::db::{self, DbPool};
use crate::error::AppResult;
use crate::models::Cursor;

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Committed cursor, or the zero cursor when none was recorded
    async fn get(&self, affiliate_id: &str) -> AppResult<Cursor>;

    /// Persist a new committed cursor
    async fn advance(&self, affiliate_id: &str, cursor: &Cursor) -> AppResult<()>;

    /// Every committed cursor, for diagnostics
    async fn all(&self) -> AppResult<Vec<(String, Cursor)>>;
}

/// SQLite-backed cursor store
pub struct SqliteCursorStore {
    pool: DbPool,
}

impl SqliteCursorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn get(&self, affiliate_id: &str) -> AppResult<Cursor> {
        Ok(db::get_cursor(&self.pool, affiliate_id)
            .await?
            .unwrap_or_default())
    }

    async fn advance(&self, affiliate_id: &str, cursor: &Cursor) -> AppResult<()> {
        db::upsert_cursor(&self.pool, affiliate_id, cursor).await
    }

    async fn all(&self) -> AppResult<Vec<(String, Cursor)>> {
        let rows = db::list_cursors(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let cursor = r.cursor();
                (r.affiliate, cursor)
            })
            .collect())
    }
}

/// In-process cursor store; state is lost on restart
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<String, Cursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, affiliate_id: &str) -> AppResult<Cursor> {
        Ok(self
            .cursors
            .read()
            .get(affiliate_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn advance(&self, affiliate_id: &str, cursor: &Cursor) -> AppResult<()> {
        self.cursors
            .write()
            .insert(affiliate_id.to_string(), cursor.clone());
        Ok(())
    }

    async fn all(&self) -> AppResult<Vec<(String, Cursor)>> {
        let mut all: Vec<(String, Cursor)> = self
            .cursors
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}
