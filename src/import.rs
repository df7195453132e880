//! CSV import for ticket exports.
//!
//! Reads spreadsheet exports (tickets, comments, timesheet entries) and
//! upserts them into SQLite. Rows are keyed on their external identifier;
//! a SHA-256 dedup hash over identity + content lets unchanged rows be
//! skipped. Malformed rows are reported on stderr and do not abort the run.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::{CommentRow, TicketRow, TimesheetRow, Visibility};

/// Outcome counters for one import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub read: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub rejected: u64,
}

pub async fn run_import(config: &Config, entity: &str, path: &Path) -> Result<()> {
    let pool = db::connect(config).await?;

    let report = match entity {
        "tickets" => import_tickets(&pool, path).await?,
        "comments" => import_comments(&pool, path).await?,
        "timesheet" => import_timesheet(&pool, path).await?,
        _ => bail!(
            "Unknown import entity: '{}'. Available: tickets, comments, timesheet",
            entity
        ),
    };

    println!("import {}", entity);
    println!("  rows read: {}", report.read);
    println!("  inserted: {}", report.inserted);
    println!("  updated: {}", report.updated);
    println!("  unchanged (skipped): {}", report.skipped);
    println!("  rejected: {}", report.rejected);
    println!("ok");

    pool.close().await;
    Ok(())
}

async fn import_tickets(pool: &SqlitePool, path: &Path) -> Result<ImportReport> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut report = ImportReport::default();

    for result in reader.records() {
        let record = result?;
        report.read += 1;

        let row = match parse_ticket_record(&headers, &record) {
            Ok(row) => row,
            Err(e) => {
                eprintln!("Warning: rejected ticket row {}: {}", report.read, e);
                report.rejected += 1;
                continue;
            }
        };

        match upsert_ticket(pool, &row).await? {
            UpsertOutcome::Inserted => report.inserted += 1,
            UpsertOutcome::Updated => report.updated += 1,
            UpsertOutcome::Unchanged => report.skipped += 1,
        }
    }

    Ok(report)
}

async fn import_comments(pool: &SqlitePool, path: &Path) -> Result<ImportReport> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut report = ImportReport::default();

    for result in reader.records() {
        let record = result?;
        report.read += 1;

        let row = match parse_comment_record(&headers, &record) {
            Ok(row) => row,
            Err(e) => {
                eprintln!("Warning: rejected comment row {}: {}", report.read, e);
                report.rejected += 1;
                continue;
            }
        };

        let existing = sqlx::query(
            "SELECT ticket_id, author, body, visibility, created_at FROM comments WHERE id = ?",
        )
        .bind(&row.id)
        .fetch_optional(pool)
        .await?;

        if let Some(ref e) = existing {
            let unchanged = e.get::<String, _>("ticket_id") == row.ticket_id
                && e.get::<Option<String>, _>("author") == row.author
                && e.get::<String, _>("body") == row.body
                && e.get::<String, _>("visibility") == row.visibility.as_str()
                && e.get::<i64, _>("created_at") == row.created_at.timestamp();
            if unchanged {
                report.skipped += 1;
                continue;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO comments (id, ticket_id, author, body, visibility, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                author = excluded.author,
                body = excluded.body,
                visibility = excluded.visibility,
                created_at = excluded.created_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.ticket_id)
        .bind(&row.author)
        .bind(&row.body)
        .bind(row.visibility.as_str())
        .bind(row.created_at.timestamp())
        .execute(pool)
        .await?;

        if existing.is_some() {
            report.updated += 1;
        } else {
            report.inserted += 1;
        }
    }

    Ok(report)
}

async fn import_timesheet(pool: &SqlitePool, path: &Path) -> Result<ImportReport> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut report = ImportReport::default();

    for result in reader.records() {
        let record = result?;
        report.read += 1;

        let row = match parse_timesheet_record(&headers, &record) {
            Ok(row) => row,
            Err(e) => {
                eprintln!("Warning: rejected timesheet row {}: {}", report.read, e);
                report.rejected += 1;
                continue;
            }
        };

        let existing = sqlx::query(
            "SELECT ticket_id, user, hours, entry_date, notes FROM timesheet_entries WHERE id = ?",
        )
        .bind(&row.id)
        .fetch_optional(pool)
        .await?;

        if let Some(ref e) = existing {
            let unchanged = e.get::<String, _>("ticket_id") == row.ticket_id
                && e.get::<String, _>("user") == row.user
                && (e.get::<f64, _>("hours") - row.hours).abs() < f64::EPSILON
                && e.get::<i64, _>("entry_date") == row.entry_date.timestamp()
                && e.get::<Option<String>, _>("notes") == row.notes;
            if unchanged {
                report.skipped += 1;
                continue;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO timesheet_entries (id, ticket_id, user, hours, entry_date, notes)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user = excluded.user,
                hours = excluded.hours,
                entry_date = excluded.entry_date,
                notes = excluded.notes
            "#,
        )
        .bind(&row.id)
        .bind(&row.ticket_id)
        .bind(&row.user)
        .bind(row.hours)
        .bind(row.entry_date.timestamp())
        .bind(&row.notes)
        .execute(pool)
        .await?;

        if existing.is_some() {
            report.updated += 1;
        } else {
            report.inserted += 1;
        }
    }

    Ok(report)
}

enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

async fn upsert_ticket(pool: &SqlitePool, row: &TicketRow) -> Result<UpsertOutcome> {
    let dedup_hash = ticket_dedup_hash(row);

    let existing: Option<String> =
        sqlx::query_scalar("SELECT dedup_hash FROM tickets WHERE id = ?")
            .bind(&row.id)
            .fetch_optional(pool)
            .await?;

    if existing.as_deref() == Some(&dedup_hash) {
        return Ok(UpsertOutcome::Unchanged);
    }

    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    // Tier is preserved across re-imports; only the backfill writes it.
    sqlx::query(
        r#"
        INSERT INTO tickets (id, title, category, status, account, created_at, closed_at,
                             assignee, root_cause, description, resolution, tier,
                             updated_at, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            category = excluded.category,
            status = excluded.status,
            account = excluded.account,
            created_at = excluded.created_at,
            closed_at = excluded.closed_at,
            assignee = excluded.assignee,
            root_cause = excluded.root_cause,
            description = excluded.description,
            resolution = excluded.resolution,
            updated_at = excluded.updated_at,
            dedup_hash = excluded.dedup_hash
        "#,
    )
    .bind(&row.id)
    .bind(&row.title)
    .bind(&row.category)
    .bind(&row.status)
    .bind(&row.account)
    .bind(row.created_at.timestamp())
    .bind(row.closed_at.map(|t| t.timestamp()))
    .bind(&row.assignee)
    .bind(&row.root_cause)
    .bind(&row.description)
    .bind(&row.resolution)
    .bind(now)
    .bind(&dedup_hash)
    .execute(&mut *tx)
    .await?;

    // Refresh the FTS row for this ticket.
    sqlx::query("DELETE FROM tickets_fts WHERE ticket_id = ?")
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO tickets_fts (ticket_id, text) VALUES (?, ?)")
        .bind(&row.id)
        .bind(row.searchable_text())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if existing.is_some() {
        Ok(UpsertOutcome::Updated)
    } else {
        Ok(UpsertOutcome::Inserted)
    }
}

/// Hash every imported content column, so a re-import that changes any
/// field (not just the searchable text) is picked up as an update.
fn ticket_dedup_hash(row: &TicketRow) -> String {
    let mut hasher = Sha256::new();
    for part in [
        row.id.as_str(),
        row.status.as_str(),
        row.category.as_str(),
        row.account.as_str(),
        row.assignee.as_deref().unwrap_or(""),
    ] {
        hasher.update(part.as_bytes());
        // Field separator, so ("ab","c") and ("a","bc") hash differently.
        hasher.update([0u8]);
    }
    hasher.update(row.created_at.timestamp().to_le_bytes());
    hasher.update(
        row.closed_at
            .map(|t| t.timestamp())
            .unwrap_or(0)
            .to_le_bytes(),
    );
    hasher.update(row.searchable_text().as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============ Record parsing ============

fn field<'a>(
    headers: &csv::StringRecord,
    record: &'a csv::StringRecord,
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required<'a>(
    headers: &csv::StringRecord,
    record: &'a csv::StringRecord,
    name: &str,
) -> Result<&'a str> {
    field(headers, record, name).ok_or_else(|| anyhow::anyhow!("missing field '{}'", name))
}

fn parse_ticket_record(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
) -> Result<TicketRow> {
    let created_at = parse_timestamp(required(headers, record, "created_at")?)?;
    let closed_at = field(headers, record, "closed_at")
        .map(parse_timestamp)
        .transpose()?;

    Ok(TicketRow {
        id: required(headers, record, "id")?.to_string(),
        title: required(headers, record, "title")?.to_string(),
        category: field(headers, record, "category").unwrap_or("").to_string(),
        status: field(headers, record, "status").unwrap_or("Open").to_string(),
        account: field(headers, record, "account").unwrap_or("").to_string(),
        created_at,
        closed_at,
        assignee: field(headers, record, "assignee").map(String::from),
        root_cause: field(headers, record, "root_cause").map(String::from),
        description: field(headers, record, "description")
            .unwrap_or("")
            .to_string(),
        resolution: field(headers, record, "resolution").map(String::from),
    })
}

fn parse_comment_record(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
) -> Result<CommentRow> {
    let visibility: Visibility = field(headers, record, "visibility")
        .unwrap_or("internal")
        .parse()?;

    Ok(CommentRow {
        id: required(headers, record, "id")?.to_string(),
        ticket_id: required(headers, record, "ticket_id")?.to_string(),
        author: field(headers, record, "author").map(String::from),
        body: required(headers, record, "body")?.to_string(),
        visibility,
        created_at: parse_timestamp(required(headers, record, "created_at")?)?,
    })
}

fn parse_timesheet_record(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
) -> Result<TimesheetRow> {
    let hours: f64 = required(headers, record, "hours")?
        .parse()
        .with_context(|| "invalid hours value")?;
    if !(0.0..=24.0).contains(&hours) {
        bail!("hours out of range: {}", hours);
    }

    Ok(TimesheetRow {
        id: required(headers, record, "id")?.to_string(),
        ticket_id: required(headers, record, "ticket_id")?.to_string(),
        user: required(headers, record, "user")?.to_string(),
        hours,
        entry_date: parse_timestamp(required(headers, record, "entry_date")?)?,
        notes: field(headers, record, "notes").map(String::from),
    })
}

/// Parse a timestamp from the formats ServiceDesk exports actually use.
///
/// Accepted: RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`,
/// `DD/MM/YYYY HH:MM`, and bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("invalid date: {}", s))?;
        return Ok(Utc.from_utc_datetime(&naive));
    }

    bail!("unrecognized timestamp format: '{}'", s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        for s in [
            "2025-03-14T09:26:53Z",
            "2025-03-14 09:26:53",
            "2025-03-14T09:26:53",
            "14/03/2025 09:26",
            "2025-03-14",
        ] {
            let dt = parse_timestamp(s).unwrap();
            assert_eq!(dt.format("%Y-%m-%d").to_string(), "2025-03-14", "{}", s);
        }
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("next tuesday").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_ticket_record_requires_id_and_title() {
        let headers = csv::StringRecord::from(vec!["id", "title", "created_at"]);
        let record = csv::StringRecord::from(vec!["", "VPN down", "2025-01-01"]);
        assert!(parse_ticket_record(&headers, &record).is_err());

        let record = csv::StringRecord::from(vec!["T-1", "VPN down", "2025-01-01"]);
        let row = parse_ticket_record(&headers, &record).unwrap();
        assert_eq!(row.id, "T-1");
        assert_eq!(row.status, "Open");
    }

    #[test]
    fn test_header_matching_is_case_insensitive() {
        let headers = csv::StringRecord::from(vec!["ID", "Title", "Created_At", "Status"]);
        let record = csv::StringRecord::from(vec!["T-2", "Printer jam", "2025-02-02", "Closed"]);
        let row = parse_ticket_record(&headers, &record).unwrap();
        assert_eq!(row.status, "Closed");
    }

    #[test]
    fn test_timesheet_hours_validated() {
        let headers =
            csv::StringRecord::from(vec!["id", "ticket_id", "user", "hours", "entry_date"]);
        let record =
            csv::StringRecord::from(vec!["ts-1", "T-1", "alex", "25.0", "2025-01-01"]);
        assert!(parse_timesheet_record(&headers, &record).is_err());

        let record = csv::StringRecord::from(vec!["ts-1", "T-1", "alex", "1.5", "2025-01-01"]);
        let row = parse_timesheet_record(&headers, &record).unwrap();
        assert!((row.hours - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dedup_hash_changes_with_content() {
        let headers = csv::StringRecord::from(vec!["id", "title", "created_at"]);
        let record = csv::StringRecord::from(vec!["T-1", "VPN down", "2025-01-01"]);
        let a = parse_ticket_record(&headers, &record).unwrap();
        let mut b = a.clone();
        b.status = "Closed".to_string();
        assert_ne!(ticket_dedup_hash(&a), ticket_dedup_hash(&b));
        assert_eq!(ticket_dedup_hash(&a), ticket_dedup_hash(&a.clone()));
    }

    #[test]
    fn test_dedup_hash_covers_every_imported_field() {
        let headers = csv::StringRecord::from(vec!["id", "title", "created_at"]);
        let record = csv::StringRecord::from(vec!["T-1", "VPN down", "2025-01-01"]);
        let base = parse_ticket_record(&headers, &record).unwrap();

        // A re-import that changes only one of these must not be skipped
        // as unchanged.
        let mut assignee = base.clone();
        assignee.assignee = Some("lee".into());
        assert_ne!(ticket_dedup_hash(&base), ticket_dedup_hash(&assignee));

        let mut account = base.clone();
        account.account = "Globex".into();
        assert_ne!(ticket_dedup_hash(&base), ticket_dedup_hash(&account));

        let mut category = base.clone();
        category.category = "Network".into();
        assert_ne!(ticket_dedup_hash(&base), ticket_dedup_hash(&category));
    }
}
