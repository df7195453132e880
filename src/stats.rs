//! Database statistics and health overview.
//!
//! A quick summary of what's in the store: row counts, tier distribution,
//! embedding and scoring coverage, FCR, and checkpoint ages. Used by
//! `desk stats` to give confidence that imports and backfills are working.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_tickets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets")
        .fetch_one(&pool)
        .await?;
    let total_comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
        .fetch_one(&pool)
        .await?;
    let total_timesheet: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM timesheet_entries")
        .fetch_one(&pool)
        .await?;
    let total_hours: Option<f64> = sqlx::query_scalar("SELECT SUM(hours) FROM timesheet_entries")
        .fetch_one(&pool)
        .await?;
    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ticket_vectors")
        .fetch_one(&pool)
        .await?;
    let public_comments: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE visibility = 'public'")
            .fetch_one(&pool)
            .await?;
    let scored_comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quality_scores")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("desklens — Database Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Tickets:     {}", total_tickets);
    println!("  Comments:    {}", total_comments);
    println!(
        "  Timesheet:   {} entries ({:.1} hours)",
        total_timesheet,
        total_hours.unwrap_or(0.0)
    );
    println!(
        "  Indexed:     {} / {} ({}%)",
        total_embedded,
        total_tickets,
        percentage(total_embedded, total_tickets)
    );
    println!(
        "  Scored:      {} / {} public comments ({}%)",
        scored_comments,
        public_comments,
        percentage(scored_comments, public_comments)
    );

    // Tier distribution
    let tier_rows = sqlx::query(
        r#"
        SELECT COALESCE(tier, '(unlabeled)') AS tier, COUNT(*) AS n
        FROM tickets
        GROUP BY tier
        ORDER BY tier
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if total_tickets > 0 {
        println!();
        println!("  By tier:");
        for row in &tier_rows {
            let tier: String = row.get("tier");
            let n: i64 = row.get("n");
            println!(
                "    {:<12} {:>6}  ({}%)",
                tier,
                n,
                percentage(n, total_tickets)
            );
        }
    }

    // First Contact Resolution: closed tickets with at most one public
    // comment, over all closed tickets.
    let closed: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE closed_at IS NOT NULL")
            .fetch_one(&pool)
            .await?;
    let fcr: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM tickets t
        WHERE t.closed_at IS NOT NULL
          AND (SELECT COUNT(*) FROM comments c
               WHERE c.ticket_id = t.id AND c.visibility = 'public') <= 1
        "#,
    )
    .fetch_one(&pool)
    .await?;

    if closed > 0 {
        println!();
        println!(
            "  FCR:         {} / {} closed tickets ({}%)",
            fcr,
            closed,
            percentage(fcr, closed)
        );
    }

    // Checkpoint ages
    let checkpoint_rows = sqlx::query("SELECT job, updated_at FROM checkpoints ORDER BY job")
        .fetch_all(&pool)
        .await?;

    if !checkpoint_rows.is_empty() {
        println!();
        println!("  Checkpoints:");
        for row in &checkpoint_rows {
            let job: String = row.get("job");
            let ts: i64 = row.get("updated_at");
            println!("    {:<12} {}", job, format_ts_relative(ts));
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn percentage(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        part * 100 / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
