//! PostgreSQL reporting warehouse: connection and schema.
//!
//! The warehouse is the dashboard-facing copy of the ticket store. Columns
//! are retyped on the way in: epoch-second INTEGERs become TIMESTAMPTZ and
//! hours become DOUBLE PRECISION. `user` is a reserved word in Postgres, so
//! the timesheet column is named `user_name` here.

use anyhow::{bail, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<PgPool> {
    let url = match config.warehouse.resolve_url() {
        Some(url) => url,
        None => bail!(
            "Warehouse is not configured. Set [warehouse] url in config \
             or the DESK_WAREHOUSE_URL environment variable."
        ),
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Create the reporting schema. Idempotent; run by `desk etl init`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'Open',
            account TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL,
            closed_at TIMESTAMPTZ,
            assignee TEXT,
            root_cause TEXT,
            description TEXT NOT NULL DEFAULT '',
            resolution TEXT,
            tier TEXT CHECK (tier IN ('L1', 'L2', 'L3')),
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL REFERENCES tickets(id),
            author TEXT,
            body TEXT NOT NULL,
            visibility TEXT NOT NULL CHECK (visibility IN ('public', 'internal')),
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS timesheet_entries (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL REFERENCES tickets(id),
            user_name TEXT NOT NULL,
            hours DOUBLE PRECISION NOT NULL,
            entry_date TIMESTAMPTZ NOT NULL,
            notes TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dw_tickets_status ON tickets(status)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dw_tickets_tier ON tickets(tier)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dw_comments_ticket ON comments(ticket_id)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_dw_timesheet_ticket ON timesheet_entries(ticket_id)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
