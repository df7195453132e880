//! Ticket retrieval: keyword (FTS5), semantic (vector), and hybrid search.
//!
//! Hybrid mode min-max normalizes each channel's scores to `[0, 1]` and
//! merges them as `(1 - alpha) * keyword + alpha * semantic`. One vector is
//! stored per ticket, so no per-chunk grouping is needed.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::SearchResult;

pub struct SearchParams {
    pub query: String,
    pub mode: String,
    pub status: Option<String>,
    pub tier: Option<String>,
    pub since: Option<String>,
    pub limit: Option<i64>,
}

/// Core search returning structured results (used by CLI and server).
pub async fn search_tickets(config: &Config, params: &SearchParams) -> Result<Vec<SearchResult>> {
    if params.query.trim().is_empty() {
        return Ok(Vec::new());
    }

    match params.mode.as_str() {
        "keyword" | "semantic" | "hybrid" => {}
        other => bail!(
            "Unknown search mode: {}. Use keyword, semantic, or hybrid.",
            other
        ),
    }

    if (params.mode == "semantic" || params.mode == "hybrid") && !config.embedding.is_enabled() {
        bail!(
            "Mode '{}' requires embeddings. Set [embedding] provider in config.",
            params.mode
        );
    }

    let pool = db::connect(config).await?;

    let keyword_candidates = if params.mode == "keyword" || params.mode == "hybrid" {
        fetch_keyword_candidates(&pool, &params.query, config.retrieval.candidate_k_keyword).await?
    } else {
        Vec::new()
    };

    let vector_candidates = if params.mode == "semantic" || params.mode == "hybrid" {
        fetch_vector_candidates(&pool, config, &params.query, config.retrieval.candidate_k_vector)
            .await?
    } else {
        Vec::new()
    };

    if keyword_candidates.is_empty() && vector_candidates.is_empty() {
        pool.close().await;
        return Ok(Vec::new());
    }

    let norm_keyword = normalize_scores(&keyword_candidates);
    let norm_vector = normalize_scores(&vector_candidates);

    let kw_map: HashMap<&str, f64> = norm_keyword
        .iter()
        .map(|(c, s)| (c.ticket_id.as_str(), *s))
        .collect();
    let vec_map: HashMap<&str, f64> = norm_vector
        .iter()
        .map(|(c, s)| (c.ticket_id.as_str(), *s))
        .collect();

    let mut all: HashMap<String, &Candidate> = HashMap::new();
    for c in &keyword_candidates {
        all.entry(c.ticket_id.clone()).or_insert(c);
    }
    for c in &vector_candidates {
        all.entry(c.ticket_id.clone()).or_insert(c);
    }

    let effective_alpha = match params.mode.as_str() {
        "keyword" => 0.0,
        "semantic" => 1.0,
        _ => config.retrieval.hybrid_alpha,
    };

    let since_ts = match params.since {
        Some(ref s) => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| anyhow::anyhow!("Invalid since date: '{}'. Use YYYY-MM-DD.", s))?;
            Some(date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp())
        }
        None => None,
    };

    let mut results: Vec<SearchResult> = Vec::new();

    for (ticket_id, cand) in &all {
        let k = kw_map.get(ticket_id.as_str()).copied().unwrap_or(0.0);
        let v = vec_map.get(ticket_id.as_str()).copied().unwrap_or(0.0);
        let score = (1.0 - effective_alpha) * k + effective_alpha * v;

        let row = sqlx::query(
            "SELECT id, title, status, tier, updated_at FROM tickets WHERE id = ?",
        )
        .bind(ticket_id)
        .fetch_optional(&pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => continue,
        };

        let status: String = row.get("status");
        let tier: Option<String> = row.get("tier");
        let updated_at: i64 = row.get("updated_at");

        if let Some(ref want) = params.status {
            if !status.eq_ignore_ascii_case(want) {
                continue;
            }
        }
        if let Some(ref want) = params.tier {
            if tier.as_deref() != Some(want.as_str()) {
                continue;
            }
        }
        if let Some(ts) = since_ts {
            if updated_at < ts {
                continue;
            }
        }

        results.push(SearchResult {
            id: row.get("id"),
            title: row.get("title"),
            status,
            tier,
            updated_at,
            score,
            snippet: cand.snippet.clone(),
        });
    }

    // Sort: score desc, updated_at desc, id asc (deterministic)
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.updated_at.cmp(&a.updated_at))
            .then(a.id.cmp(&b.id))
    });

    let final_limit = params.limit.unwrap_or(config.retrieval.final_limit);
    results.truncate(final_limit as usize);

    pool.close().await;
    Ok(results)
}

/// CLI entry point — runs the search and prints ranked results.
pub async fn run_search(config: &Config, params: &SearchParams) -> Result<()> {
    let results = search_tickets(config, params).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let date = chrono::DateTime::from_timestamp(result.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        println!("{}. [{:.2}] {} — {}", i + 1, result.score, result.id, result.title);
        println!(
            "    status: {}   tier: {}   updated: {}",
            result.status,
            result.tier.as_deref().unwrap_or("-"),
            date
        );
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        println!();
    }

    Ok(())
}

#[derive(Debug, Clone)]
struct Candidate {
    ticket_id: String,
    raw_score: f64,
    snippet: String,
}

async fn fetch_keyword_candidates(
    pool: &SqlitePool,
    query: &str,
    candidate_k: i64,
) -> Result<Vec<Candidate>> {
    let rows = sqlx::query(
        r#"
        SELECT ticket_id, rank,
               snippet(tickets_fts, 1, '>>>', '<<<', '...', 48) AS snippet
        FROM tickets_fts
        WHERE tickets_fts MATCH ?
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(query)
    .bind(candidate_k)
    .fetch_all(pool)
    .await?;

    let candidates: Vec<Candidate> = rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            Candidate {
                ticket_id: row.get("ticket_id"),
                raw_score: -rank, // negate so higher = better
                snippet: row.get("snippet"),
            }
        })
        .collect();

    Ok(candidates)
}

async fn fetch_vector_candidates(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    candidate_k: i64,
) -> Result<Vec<Candidate>> {
    let query_vec = embedding::embed_query(&config.embedding, query).await?;

    let rows = sqlx::query(
        r#"
        SELECT tv.ticket_id, tv.embedding,
               COALESCE(substr(f.text, 1, 240), '') AS snippet
        FROM ticket_vectors tv
        JOIN tickets_fts f ON f.ticket_id = tv.ticket_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut candidates: Vec<Candidate> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let similarity = embedding::cosine_similarity(&query_vec, &vec) as f64;
            Candidate {
                ticket_id: row.get("ticket_id"),
                raw_score: similarity,
                snippet: row.get("snippet"),
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(candidate_k as usize);

    Ok(candidates)
}

/// Min-max normalize scores to [0, 1]; a single candidate (or all-equal
/// scores) normalizes to 1.0.
fn normalize_scores(candidates: &[Candidate]) -> Vec<(&Candidate, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c, norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candidate(ticket_id: &str, score: f64) -> Candidate {
        Candidate {
            ticket_id: ticket_id.to_string(),
            raw_score: score,
            snippet: String::new(),
        }
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_normalize_single() {
        let candidates = vec![make_candidate("T-1", 5.0)];
        let result = normalize_scores(&candidates);
        assert_eq!(result.len(), 1);
        assert!((result[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_range() {
        let candidates = vec![
            make_candidate("T-1", 10.0),
            make_candidate("T-2", 5.0),
            make_candidate("T-3", 0.0),
        ];
        let result = normalize_scores(&candidates);
        assert!((result[0].1 - 1.0).abs() < 1e-9);
        assert!((result[1].1 - 0.5).abs() < 1e-9);
        assert!((result[2].1 - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_all_equal() {
        let candidates = vec![make_candidate("T-1", 3.0), make_candidate("T-2", 3.0)];
        for (_, score) in normalize_scores(&candidates) {
            assert!((score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scores_always_in_unit() {
        let candidates = vec![
            make_candidate("T-1", -5.0),
            make_candidate("T-2", 100.0),
            make_candidate("T-3", 42.0),
        ];
        for (_, score) in normalize_scores(&candidates) {
            assert!((0.0..=1.0).contains(&score), "Score out of range: {}", score);
        }
    }

    #[test]
    fn test_hybrid_alpha_extremes() {
        let kw = vec![make_candidate("T-1", 10.0), make_candidate("T-2", 5.0)];
        let vecs = vec![make_candidate("T-1", 0.1), make_candidate("T-2", 0.9)];

        let kw_map: HashMap<&str, f64> = normalize_scores(&kw)
            .iter()
            .map(|(c, s)| (c.ticket_id.as_str(), *s))
            .collect();
        let vec_map: HashMap<&str, f64> = normalize_scores(&vecs)
            .iter()
            .map(|(c, s)| (c.ticket_id.as_str(), *s))
            .collect();

        let hybrid = |alpha: f64, id: &str| {
            (1.0 - alpha) * kw_map.get(id).copied().unwrap_or(0.0)
                + alpha * vec_map.get(id).copied().unwrap_or(0.0)
        };

        // alpha=0 ranks by keyword (T-1 first), alpha=1 by vector (T-2 first)
        assert!(hybrid(0.0, "T-1") > hybrid(0.0, "T-2"));
        assert!(hybrid(1.0, "T-2") > hybrid(1.0, "T-1"));
    }
}
