use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Tickets table. `id` is the external ticket identifier from the
    // ServiceDesk export; timestamps are epoch seconds.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'Open',
            account TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            closed_at INTEGER,
            assignee TEXT,
            root_cause TEXT,
            description TEXT NOT NULL DEFAULT '',
            resolution TEXT,
            tier TEXT CHECK (tier IN ('L1', 'L2', 'L3')),
            updated_at INTEGER NOT NULL,
            dedup_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL,
            author TEXT,
            body TEXT NOT NULL,
            visibility TEXT NOT NULL CHECK (visibility IN ('public', 'internal')),
            created_at INTEGER NOT NULL,
            FOREIGN KEY (ticket_id) REFERENCES tickets(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS timesheet_entries (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL,
            user TEXT NOT NULL,
            hours REAL NOT NULL,
            entry_date INTEGER NOT NULL,
            notes TEXT,
            FOREIGN KEY (ticket_id) REFERENCES tickets(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Quality verdicts from the LLM scorer, one per comment per model run.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quality_scores (
            comment_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            clarity INTEGER NOT NULL,
            empathy INTEGER NOT NULL,
            completeness INTEGER NOT NULL,
            overall INTEGER NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            scored_at INTEGER NOT NULL,
            FOREIGN KEY (comment_id) REFERENCES comments(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Embedding bookkeeping + vectors, one per ticket.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            ticket_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (ticket_id) REFERENCES tickets(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ticket_vectors (
            ticket_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            FOREIGN KEY (ticket_id) REFERENCES tickets(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Incremental cursors for the ETL and indexing jobs.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            job TEXT PRIMARY KEY,
            cursor TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // FTS5 virtual table over ticket searchable text.
    // FTS5 CREATE is not idempotent natively, so we check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='tickets_fts'",
    )
    .fetch_one(&pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE tickets_fts USING fts5(
                ticket_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(&pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_ticket_id ON comments(ticket_id)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_timesheet_ticket_id ON timesheet_entries(ticket_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_updated_at ON tickets(updated_at DESC)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
