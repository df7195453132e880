//! Support-tier classification (L1/L2/L3).
//!
//! A keyword-heuristic classifier over ticket text: L3 keywords are checked
//! first, then L2; a ticket matching neither list defaults to L1 (first-line).
//! Matching is case-insensitive substring search over the concatenated
//! title, description, resolution, and root cause.

use anyhow::Result;
use sqlx::Row;

use crate::config::{Config, TieringConfig};
use crate::db;
use crate::models::Tier;

/// Classify one ticket's text against the configured keyword lists.
pub fn classify(tiering: &TieringConfig, text: &str) -> Tier {
    let haystack = text.to_lowercase();

    if tiering
        .l3_keywords
        .iter()
        .any(|kw| haystack.contains(&kw.to_lowercase()))
    {
        return Tier::L3;
    }

    if tiering
        .l2_keywords
        .iter()
        .any(|kw| haystack.contains(&kw.to_lowercase()))
    {
        return Tier::L2;
    }

    Tier::L1
}

/// Run the tier backfill: label tickets that have no tier yet
/// (or all tickets with `--full`).
pub async fn run_backfill(
    config: &Config,
    full: bool,
    limit: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;

    // SQLite treats a negative LIMIT as unlimited.
    let limit_val = limit.map(|l| l as i64).unwrap_or(-1);
    let query = if full {
        r#"
        SELECT id, title, description, resolution, root_cause
        FROM tickets
        ORDER BY created_at
        LIMIT ?
        "#
    } else {
        r#"
        SELECT id, title, description, resolution, root_cause
        FROM tickets
        WHERE tier IS NULL
        ORDER BY created_at
        LIMIT ?
        "#
    };

    let rows = sqlx::query(query).bind(limit_val).fetch_all(&pool).await?;

    let mut counts = [0u64; 3]; // L1, L2, L3
    let mut labeled = 0u64;

    for row in &rows {
        let id: String = row.get("id");
        let title: String = row.get("title");
        let description: String = row.get("description");
        let resolution: Option<String> = row.get("resolution");
        let root_cause: Option<String> = row.get("root_cause");

        let mut text = format!("{}\n{}", title, description);
        if let Some(res) = resolution {
            text.push('\n');
            text.push_str(&res);
        }
        if let Some(rc) = root_cause {
            text.push('\n');
            text.push_str(&rc);
        }

        let tier = classify(&config.tiering, &text);
        match tier {
            Tier::L1 => counts[0] += 1,
            Tier::L2 => counts[1] += 1,
            Tier::L3 => counts[2] += 1,
        }

        if !dry_run {
            sqlx::query("UPDATE tickets SET tier = ? WHERE id = ?")
                .bind(tier.as_str())
                .bind(&id)
                .execute(&pool)
                .await?;
            labeled += 1;
        }
    }

    if dry_run {
        println!("tier backfill (dry-run)");
    } else {
        println!("tier backfill");
    }
    println!("  candidates: {}", rows.len());
    println!("  L1: {}", counts[0]);
    println!("  L2: {}", counts[1]);
    println!("  L3: {}", counts[2]);
    if !dry_run {
        println!("  labeled: {}", labeled);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Print the current tier distribution.
pub async fn run_show(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT COALESCE(tier, '(unlabeled)') AS tier, COUNT(*) AS n
        FROM tickets
        GROUP BY tier
        ORDER BY tier
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let total: i64 = rows.iter().map(|r| r.get::<i64, _>("n")).sum();

    println!("tier distribution ({} tickets)", total);
    for row in &rows {
        let tier: String = row.get("tier");
        let n: i64 = row.get("n");
        let pct = if total > 0 { n * 100 / total } else { 0 };
        println!("  {:<12} {:>6}  ({}%)", tier, n, pct);
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiering() -> TieringConfig {
        TieringConfig::default()
    }

    #[test]
    fn test_no_match_defaults_to_l1() {
        let tier = classify(&tiering(), "User forgot their password again");
        assert_eq!(tier, Tier::L1);
    }

    #[test]
    fn test_l2_keyword_matches() {
        let tier = classify(&tiering(), "VPN tunnel drops every hour");
        assert_eq!(tier, Tier::L2);
    }

    #[test]
    fn test_l3_wins_over_l2() {
        // Text contains both an L2 keyword (vpn) and an L3 keyword
        // (root cause); L3 takes precedence.
        let tier = classify(
            &tiering(),
            "VPN outage — root cause was a memory leak in the gateway",
        );
        assert_eq!(tier, Tier::L3);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let tier = classify(&tiering(), "ACTIVE DIRECTORY replication broken");
        assert_eq!(tier, Tier::L2);
    }

    #[test]
    fn test_custom_keyword_lists() {
        let custom = TieringConfig {
            l3_keywords: vec!["kernel panic".into()],
            l2_keywords: vec!["printer".into()],
        };
        assert_eq!(classify(&custom, "Printer offline"), Tier::L2);
        assert_eq!(classify(&custom, "Server kernel panic"), Tier::L3);
        assert_eq!(classify(&custom, "vpn issue"), Tier::L1);
    }
}
