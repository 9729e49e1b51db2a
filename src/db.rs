//! Database module for the reseller monitor
//!
//! Manages the SQLite connection pool (WAL mode, full fsync) and the
//! persisted per-affiliate pagination cursors.

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::models::Cursor;
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

/// Type alias for the SQLite connection pool
pub type DbPool = Pool<Sqlite>;

/// Schema applied at startup
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS affiliate_cursors (
    affiliate TEXT PRIMARY KEY,
    last_deposit_address TEXT NOT NULL,
    last_deposit_memo TEXT NOT NULL DEFAULT '',
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Initialize the database connection pool
pub async fn init_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    // Ensure data directory exists
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Internal(format!("Failed to create database directory: {}", e))
            })?;
            info!("Created database directory: {:?}", parent);
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", config.path.display());

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        // Enable WAL mode for concurrent reads
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        // A committed cursor must survive power loss
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(std::time::Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    info!(
        "Database pool initialized: {:?} (max {} connections)",
        config.path, config.max_connections
    );

    Ok(pool)
}

/// Apply the embedded schema
pub async fn run_migrations(pool: &DbPool) -> AppResult<()> {
    sqlx::query(SCHEMA).execute(pool).await?;
    info!("Database schema applied successfully");
    Ok(())
}

/// Committed cursor row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CursorRow {
    pub affiliate: String,
    pub last_deposit_address: String,
    pub last_deposit_memo: String,
    pub updated_at: NaiveDateTime,
}

impl CursorRow {
    pub fn cursor(&self) -> Cursor {
        Cursor::new(&self.last_deposit_address, &self.last_deposit_memo)
    }
}

/// Load the committed cursor for an affiliate
pub async fn get_cursor(pool: &DbPool, affiliate: &str) -> AppResult<Option<Cursor>> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT last_deposit_address, last_deposit_memo FROM affiliate_cursors WHERE affiliate = ?",
    )
    .bind(affiliate)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(address, memo)| Cursor::new(address, memo)))
}

/// Insert or replace the committed cursor for an affiliate
pub async fn upsert_cursor(pool: &DbPool, affiliate: &str, cursor: &Cursor) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO affiliate_cursors (affiliate, last_deposit_address, last_deposit_memo, updated_at)
        VALUES (?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(affiliate) DO UPDATE SET
            last_deposit_address = excluded.last_deposit_address,
            last_deposit_memo = excluded.last_deposit_memo,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(affiliate)
    .bind(&cursor.deposit_address)
    .bind(&cursor.deposit_memo)
    .execute(pool)
    .await?;

    Ok(())
}

/// All committed cursors, for diagnostics
pub async fn list_cursors(pool: &DbPool) -> AppResult<Vec<CursorRow>> {
    let rows = sqlx::query_as::<_, CursorRow>(
        r#"
        SELECT affiliate, last_deposit_address, last_deposit_memo, updated_at
        FROM affiliate_cursors
        ORDER BY affiliate
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
