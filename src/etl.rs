//! Warehouse backfill: SQLite → PostgreSQL.
//!
//! Copies tickets (and their comments and timesheet entries) from the local
//! store into the reporting warehouse, retyping epoch-second timestamps to
//! TIMESTAMPTZ via `to_timestamp`. Incremental by default: only tickets with
//! `updated_at` past the `etl` checkpoint are copied; `--full` ignores the
//! checkpoint, `--since`/`--until`/`--limit` narrow the window as in sync.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::postgres::PgPool;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::warehouse;

const ETL_JOB: &str = "etl";

pub async fn run_etl(
    config: &Config,
    full: bool,
    dry_run: bool,
    since: Option<String>,
    until: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let pool = db::connect(config).await?;

    let checkpoint: Option<i64> = if full {
        None
    } else {
        get_checkpoint(&pool, ETL_JOB).await?
    };

    let mut ticket_ids = select_ticket_ids(&pool, checkpoint, &since, &until).await?;

    if let Some(lim) = limit {
        ticket_ids.truncate(lim);
    }

    if dry_run {
        let comment_count = count_children(&pool, "comments", &ticket_ids).await?;
        let timesheet_count = count_children(&pool, "timesheet_entries", &ticket_ids).await?;
        println!("etl run (dry-run)");
        println!("  tickets to copy: {}", ticket_ids.len());
        println!("  comments to copy: {}", comment_count);
        println!("  timesheet entries to copy: {}", timesheet_count);
        pool.close().await;
        return Ok(());
    }

    if ticket_ids.is_empty() {
        println!("etl run");
        println!("  warehouse up to date");
        pool.close().await;
        return Ok(());
    }

    let pg = warehouse::connect(config).await?;

    let mut tickets_copied = 0u64;
    let mut comments_copied = 0u64;
    let mut timesheet_copied = 0u64;
    let mut max_updated: i64 = checkpoint.unwrap_or(0);

    for ticket_id in &ticket_ids {
        let updated_at = copy_ticket(&pool, &pg, ticket_id).await?;
        tickets_copied += 1;
        if updated_at > max_updated {
            max_updated = updated_at;
        }

        comments_copied += copy_comments(&pool, &pg, ticket_id).await?;
        timesheet_copied += copy_timesheet(&pool, &pg, ticket_id).await?;
    }

    set_checkpoint(&pool, ETL_JOB, max_updated).await?;

    println!("etl run");
    println!("  tickets copied: {}", tickets_copied);
    println!("  comments copied: {}", comments_copied);
    println!("  timesheet entries copied: {}", timesheet_copied);
    println!("  checkpoint: {}", max_updated);
    println!("ok");

    pg.close().await;
    pool.close().await;
    Ok(())
}

async fn select_ticket_ids(
    pool: &SqlitePool,
    checkpoint: Option<i64>,
    since: &Option<String>,
    until: &Option<String>,
) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT id, updated_at FROM tickets ORDER BY updated_at, id")
        .fetch_all(pool)
        .await?;

    let since_ts = match since {
        Some(s) => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
            Some(date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp())
        }
        None => None,
    };
    let until_ts = match until {
        Some(s) => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
            Some(date.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp())
        }
        None => None,
    };

    let mut ids = Vec::new();
    for row in &rows {
        let updated_at: i64 = row.get("updated_at");

        if let Some(cp) = checkpoint {
            if updated_at <= cp {
                continue;
            }
        }
        if let Some(ts) = since_ts {
            if updated_at < ts {
                continue;
            }
        }
        if let Some(ts) = until_ts {
            if updated_at > ts {
                continue;
            }
        }

        ids.push(row.get("id"));
    }

    Ok(ids)
}

async fn count_children(pool: &SqlitePool, table: &str, ticket_ids: &[String]) -> Result<u64> {
    let mut total = 0u64;
    for id in ticket_ids {
        let n: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE ticket_id = ?",
            table
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;
        total += n as u64;
    }
    Ok(total)
}

/// Copy one ticket row, returning its `updated_at` for checkpoint tracking.
async fn copy_ticket(pool: &SqlitePool, pg: &PgPool, ticket_id: &str) -> Result<i64> {
    let row = sqlx::query(
        r#"
        SELECT id, title, category, status, account, created_at, closed_at,
               assignee, root_cause, description, resolution, tier, updated_at
        FROM tickets WHERE id = ?
        "#,
    )
    .bind(ticket_id)
    .fetch_one(pool)
    .await?;

    let updated_at: i64 = row.get("updated_at");

    sqlx::query(
        r#"
        INSERT INTO tickets (id, title, category, status, account, created_at, closed_at,
                             assignee, root_cause, description, resolution, tier, updated_at)
        VALUES ($1, $2, $3, $4, $5, to_timestamp($6), to_timestamp($7),
                $8, $9, $10, $11, $12, to_timestamp($13))
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            category = EXCLUDED.category,
            status = EXCLUDED.status,
            account = EXCLUDED.account,
            created_at = EXCLUDED.created_at,
            closed_at = EXCLUDED.closed_at,
            assignee = EXCLUDED.assignee,
            root_cause = EXCLUDED.root_cause,
            description = EXCLUDED.description,
            resolution = EXCLUDED.resolution,
            tier = EXCLUDED.tier,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(row.get::<String, _>("id"))
    .bind(row.get::<String, _>("title"))
    .bind(row.get::<String, _>("category"))
    .bind(row.get::<String, _>("status"))
    .bind(row.get::<String, _>("account"))
    .bind(row.get::<i64, _>("created_at") as f64)
    .bind(row.get::<Option<i64>, _>("closed_at").map(|t| t as f64))
    .bind(row.get::<Option<String>, _>("assignee"))
    .bind(row.get::<Option<String>, _>("root_cause"))
    .bind(row.get::<String, _>("description"))
    .bind(row.get::<Option<String>, _>("resolution"))
    .bind(row.get::<Option<String>, _>("tier"))
    .bind(updated_at as f64)
    .execute(pg)
    .await?;

    Ok(updated_at)
}

async fn copy_comments(pool: &SqlitePool, pg: &PgPool, ticket_id: &str) -> Result<u64> {
    let rows = sqlx::query(
        "SELECT id, ticket_id, author, body, visibility, created_at FROM comments WHERE ticket_id = ?",
    )
    .bind(ticket_id)
    .fetch_all(pool)
    .await?;

    for row in &rows {
        sqlx::query(
            r#"
            INSERT INTO comments (id, ticket_id, author, body, visibility, created_at)
            VALUES ($1, $2, $3, $4, $5, to_timestamp($6))
            ON CONFLICT (id) DO UPDATE SET
                author = EXCLUDED.author,
                body = EXCLUDED.body,
                visibility = EXCLUDED.visibility,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(row.get::<String, _>("id"))
        .bind(row.get::<String, _>("ticket_id"))
        .bind(row.get::<Option<String>, _>("author"))
        .bind(row.get::<String, _>("body"))
        .bind(row.get::<String, _>("visibility"))
        .bind(row.get::<i64, _>("created_at") as f64)
        .execute(pg)
        .await?;
    }

    Ok(rows.len() as u64)
}

async fn copy_timesheet(pool: &SqlitePool, pg: &PgPool, ticket_id: &str) -> Result<u64> {
    let rows = sqlx::query(
        "SELECT id, ticket_id, user, hours, entry_date, notes FROM timesheet_entries WHERE ticket_id = ?",
    )
    .bind(ticket_id)
    .fetch_all(pool)
    .await?;

    for row in &rows {
        sqlx::query(
            r#"
            INSERT INTO timesheet_entries (id, ticket_id, user_name, hours, entry_date, notes)
            VALUES ($1, $2, $3, $4, to_timestamp($5), $6)
            ON CONFLICT (id) DO UPDATE SET
                user_name = EXCLUDED.user_name,
                hours = EXCLUDED.hours,
                entry_date = EXCLUDED.entry_date,
                notes = EXCLUDED.notes
            "#,
        )
        .bind(row.get::<String, _>("id"))
        .bind(row.get::<String, _>("ticket_id"))
        .bind(row.get::<String, _>("user"))
        .bind(row.get::<f64, _>("hours"))
        .bind(row.get::<i64, _>("entry_date") as f64)
        .bind(row.get::<Option<String>, _>("notes"))
        .execute(pg)
        .await?;
    }

    Ok(rows.len() as u64)
}

pub async fn get_checkpoint(pool: &SqlitePool, job: &str) -> Result<Option<i64>> {
    let result: Option<String> = sqlx::query_scalar("SELECT cursor FROM checkpoints WHERE job = ?")
        .bind(job)
        .fetch_optional(pool)
        .await?;

    Ok(result.and_then(|s| s.parse::<i64>().ok()))
}

pub async fn set_checkpoint(pool: &SqlitePool, job: &str, cursor_val: i64) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO checkpoints (job, cursor, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(job) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at
        "#,
    )
    .bind(job)
    .bind(cursor_val.to_string())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}
