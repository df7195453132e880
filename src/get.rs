//! Ticket retrieval by ID.
//!
//! Fetches one ticket with its comments, timesheet totals, and quality
//! scores. Used by the `desk get` CLI command.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::Row;

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Serialize)]
pub struct TicketResponse {
    pub id: String,
    pub title: String,
    pub category: String,
    pub status: String,
    pub account: String,
    pub created_at: String, // ISO8601
    pub closed_at: Option<String>,
    pub assignee: Option<String>,
    pub root_cause: Option<String>,
    pub description: String,
    pub resolution: Option<String>,
    pub tier: Option<String>,
    pub comments: Vec<CommentResponse>,
    pub total_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentResponse {
    pub id: String,
    pub author: Option<String>,
    pub visibility: String,
    pub created_at: String,
    pub body: String,
    pub overall_score: Option<i64>,
}

/// Core get function returning structured data.
pub async fn get_ticket(config: &Config, id: &str) -> Result<TicketResponse> {
    let pool = db::connect(config).await?;

    let row = sqlx::query(
        r#"
        SELECT id, title, category, status, account, created_at, closed_at,
               assignee, root_cause, description, resolution, tier
        FROM tickets WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => {
            pool.close().await;
            bail!("ticket not found: {}", id);
        }
    };

    let comment_rows = sqlx::query(
        r#"
        SELECT c.id, c.author, c.visibility, c.created_at, c.body, q.overall
        FROM comments c
        LEFT JOIN quality_scores q ON q.comment_id = c.id
        WHERE c.ticket_id = ?
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let comments: Vec<CommentResponse> = comment_rows
        .iter()
        .map(|row| CommentResponse {
            id: row.get("id"),
            author: row.get("author"),
            visibility: row.get("visibility"),
            created_at: format_ts_iso(row.get("created_at")),
            body: row.get("body"),
            overall_score: row.get("overall"),
        })
        .collect();

    let total_hours: Option<f64> =
        sqlx::query_scalar("SELECT SUM(hours) FROM timesheet_entries WHERE ticket_id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await?;

    let created_at: i64 = row.get("created_at");
    let closed_at: Option<i64> = row.get("closed_at");

    let response = TicketResponse {
        id: row.get("id"),
        title: row.get("title"),
        category: row.get("category"),
        status: row.get("status"),
        account: row.get("account"),
        created_at: format_ts_iso(created_at),
        closed_at: closed_at.map(format_ts_iso),
        assignee: row.get("assignee"),
        root_cause: row.get("root_cause"),
        description: row.get("description"),
        resolution: row.get("resolution"),
        tier: row.get("tier"),
        comments,
        total_hours: total_hours.unwrap_or(0.0),
    };

    pool.close().await;
    Ok(response)
}

/// CLI entry point — calls get_ticket and prints to stdout.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let ticket = match get_ticket(config, id).await {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("--- Ticket ---");
    println!("id:          {}", ticket.id);
    println!("title:       {}", ticket.title);
    println!("category:    {}", ticket.category);
    println!("status:      {}", ticket.status);
    println!("account:     {}", ticket.account);
    println!("tier:        {}", ticket.tier.as_deref().unwrap_or("(unlabeled)"));
    if let Some(ref a) = ticket.assignee {
        println!("assignee:    {}", a);
    }
    println!("created_at:  {}", ticket.created_at);
    if let Some(ref c) = ticket.closed_at {
        println!("closed_at:   {}", c);
    }
    if let Some(ref rc) = ticket.root_cause {
        println!("root_cause:  {}", rc);
    }
    println!("hours:       {:.2}", ticket.total_hours);
    println!();

    println!("--- Description ---");
    println!("{}", ticket.description);
    println!();

    if let Some(ref res) = ticket.resolution {
        println!("--- Resolution ---");
        println!("{}", res);
        println!();
    }

    println!("--- Comments ({}) ---", ticket.comments.len());
    for comment in &ticket.comments {
        let score = comment
            .overall_score
            .map(|s| format!("  quality: {}/5", s))
            .unwrap_or_default();
        println!(
            "[{} | {} | {}]{}",
            comment.created_at,
            comment.author.as_deref().unwrap_or("(unknown)"),
            comment.visibility,
            score
        );
        println!("{}", comment.body);
        println!();
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
