//! SQLite connection handling for the ticket store.
//!
//! The store is a single database file in WAL mode. Its parent directory
//! is created on first use, so `desk init` works from a fresh checkout
//! without any setup.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::Config;

/// Open a pooled connection to the ticket store, creating the database
/// file if it does not exist yet.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let store_path = &config.db.path;

    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create data directory: {}", parent.display())
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(store_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open ticket store: {}", store_path.display()))?;

    Ok(pool)
}
