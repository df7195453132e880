//! LLM quality scoring for customer-facing support comments.
//!
//! `desk score run` picks public comments that have not yet been scored by
//! the configured model, asks a local language model (Ollama `/api/chat`) to
//! rate each one against a four-part rubric (clarity, empathy, completeness,
//! overall — each 1 to 5), parses the JSON verdict, and stores it in
//! `quality_scores`. A comment whose response cannot be parsed after the
//! configured retries (default 3) is counted as failed and skipped.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};
use std::time::Duration;

use crate::config::{Config, LlmConfig};
use crate::db;
use crate::models::QualityVerdict;

pub async fn run_score(config: &Config, sample_size: Option<usize>, dry_run: bool) -> Result<()> {
    if !config.llm.is_enabled() {
        bail!("LLM provider is disabled. Set [llm] provider in config.");
    }

    let model = config
        .llm
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("llm.model required"))?;

    let pool = db::connect(config).await?;
    let sample = sample_size.unwrap_or(config.llm.sample_size);

    let pending = find_unscored_comments(&pool, &model, sample).await?;

    if dry_run {
        println!("score run (dry-run)");
        println!("  comments needing scores: {}", pending.len());
        pool.close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("score run");
        println!("  all sampled comments scored");
        pool.close().await;
        return Ok(());
    }

    let mut scored = 0u64;
    let mut failed = 0u64;

    for comment in &pending {
        match score_comment(&config.llm, &comment.body).await {
            Ok(verdict) => {
                insert_score(&pool, &comment.id, &model, &verdict).await?;
                scored += 1;
            }
            Err(e) => {
                eprintln!("Warning: scoring comment {} failed: {}", comment.id, e);
                failed += 1;
            }
        }
    }

    println!("score run");
    println!("  sampled: {}", pending.len());
    println!("  scored: {}", scored);
    println!("  failed: {}", failed);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Print aggregate rubric averages and the lowest-scoring comments.
pub async fn run_report(config: &Config, worst: usize) -> Result<()> {
    let pool = db::connect(config).await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quality_scores")
        .fetch_one(&pool)
        .await?;

    if count == 0 {
        println!("No quality scores yet. Run `desk score run` first.");
        pool.close().await;
        return Ok(());
    }

    let row = sqlx::query(
        r#"
        SELECT AVG(clarity) AS clarity, AVG(empathy) AS empathy,
               AVG(completeness) AS completeness, AVG(overall) AS overall
        FROM quality_scores
        "#,
    )
    .fetch_one(&pool)
    .await?;

    println!("quality report ({} scored comments)", count);
    println!("  clarity:      {:.2}", row.get::<f64, _>("clarity"));
    println!("  empathy:      {:.2}", row.get::<f64, _>("empathy"));
    println!("  completeness: {:.2}", row.get::<f64, _>("completeness"));
    println!("  overall:      {:.2}", row.get::<f64, _>("overall"));

    let worst_rows = sqlx::query(
        r#"
        SELECT q.comment_id, q.overall, q.notes, c.ticket_id, c.body
        FROM quality_scores q
        JOIN comments c ON c.id = q.comment_id
        ORDER BY q.overall ASC, q.comment_id ASC
        LIMIT ?
        "#,
    )
    .bind(worst as i64)
    .fetch_all(&pool)
    .await?;

    if !worst_rows.is_empty() {
        println!();
        println!("  lowest-scoring comments:");
        for row in &worst_rows {
            let body: String = row.get("body");
            let excerpt: String = body.chars().take(80).collect();
            println!(
                "    [{}] ticket {} comment {} — \"{}\"",
                row.get::<i64, _>("overall"),
                row.get::<String, _>("ticket_id"),
                row.get::<String, _>("comment_id"),
                excerpt.replace('\n', " ")
            );
            let notes: String = row.get("notes");
            if !notes.is_empty() {
                println!("      notes: {}", notes);
            }
        }
    }

    pool.close().await;
    Ok(())
}

struct UnscoredComment {
    id: String,
    body: String,
}

async fn find_unscored_comments(
    pool: &SqlitePool,
    model: &str,
    limit: usize,
) -> Result<Vec<UnscoredComment>> {
    // Customer-facing comments only; most recent first.
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.body
        FROM comments c
        LEFT JOIN quality_scores q ON q.comment_id = c.id AND q.model = ?
        WHERE c.visibility = 'public' AND q.comment_id IS NULL
        ORDER BY c.created_at DESC
        LIMIT ?
        "#,
    )
    .bind(model)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| UnscoredComment {
            id: row.get("id"),
            body: row.get("body"),
        })
        .collect())
}

async fn insert_score(
    pool: &SqlitePool,
    comment_id: &str,
    model: &str,
    verdict: &QualityVerdict,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO quality_scores (comment_id, model, clarity, empathy, completeness,
                                    overall, notes, scored_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(comment_id) DO UPDATE SET
            model = excluded.model,
            clarity = excluded.clarity,
            empathy = excluded.empathy,
            completeness = excluded.completeness,
            overall = excluded.overall,
            notes = excluded.notes,
            scored_at = excluded.scored_at
        "#,
    )
    .bind(comment_id)
    .bind(model)
    .bind(verdict.clarity)
    .bind(verdict.empathy)
    .bind(verdict.completeness)
    .bind(verdict.overall)
    .bind(&verdict.notes)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

fn build_prompt(comment: &str) -> String {
    format!(
        "You are reviewing a customer-facing support comment for quality.\n\
         Rate it on four dimensions, each an integer from 1 (poor) to 5 (excellent):\n\
         - clarity: is the comment easy to understand?\n\
         - empathy: does it acknowledge the customer's situation?\n\
         - completeness: does it fully address the issue or state next steps?\n\
         - overall: your overall judgement.\n\
         Respond with ONLY a JSON object of the form\n\
         {{\"clarity\": n, \"empathy\": n, \"completeness\": n, \"overall\": n, \"notes\": \"one sentence\"}}\n\
         \n\
         Comment:\n{}",
        comment
    )
}

/// Ask the LLM for a verdict on one comment, retrying on transient errors
/// and unparseable responses.
async fn score_comment(llm: &LlmConfig, comment: &str) -> Result<QualityVerdict> {
    let model = llm
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("llm.model required"))?;
    let url = llm.url.as_deref().unwrap_or("http://localhost:11434");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(llm.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": build_prompt(comment) }],
        "stream": false,
        "format": "json",
    });

    let mut last_err = None;

    for attempt in 0..=llm.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(format!("{}/api/chat", url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    let content = json
                        .get("message")
                        .and_then(|m| m.get("content"))
                        .and_then(|c| c.as_str())
                        .ok_or_else(|| {
                            anyhow::anyhow!("Invalid chat response: missing message content")
                        })?;

                    // A malformed verdict is retried like a transient error;
                    // small local models occasionally miss the format.
                    match parse_verdict(content) {
                        Ok(verdict) => return Ok(verdict),
                        Err(e) => {
                            last_err = Some(e);
                            continue;
                        }
                    }
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err =
                        Some(anyhow::anyhow!("LLM API error {}: {}", status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("LLM API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "LLM connection error (is Ollama running at {}?): {}",
                    url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Scoring failed after retries")))
}

/// Parse a model response into a [`QualityVerdict`].
///
/// Lenient on framing: code fences and surrounding prose are stripped by
/// extracting the first `{...}` object. Strict on content: every rubric
/// field must be an integer in `1..=5`.
pub fn parse_verdict(response: &str) -> Result<QualityVerdict> {
    let json_str = extract_json_object(response)
        .ok_or_else(|| anyhow::anyhow!("no JSON object in response"))?;

    let value: serde_json::Value = serde_json::from_str(json_str)?;

    let field = |name: &str| -> Result<i64> {
        let n = value
            .get(name)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| anyhow::anyhow!("missing or non-integer field '{}'", name))?;
        if !(1..=5).contains(&n) {
            bail!("field '{}' out of range: {}", name, n);
        }
        Ok(n)
    };

    Ok(QualityVerdict {
        clarity: field("clarity")?,
        empathy: field("empathy")?,
        completeness: field("completeness")?,
        overall: field("overall")?,
        notes: value
            .get("notes")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
    })
}

/// Return the first balanced `{...}` span in the text, if any.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_verdict() {
        let v = parse_verdict(
            r#"{"clarity": 4, "empathy": 3, "completeness": 5, "overall": 4, "notes": "Good."}"#,
        )
        .unwrap();
        assert_eq!(v.clarity, 4);
        assert_eq!(v.overall, 4);
        assert_eq!(v.notes, "Good.");
    }

    #[test]
    fn test_parse_verdict_with_code_fence() {
        let response = "Here is my assessment:\n```json\n{\"clarity\": 2, \"empathy\": 2, \"completeness\": 1, \"overall\": 2, \"notes\": \"Terse.\"}\n```\nHope that helps!";
        let v = parse_verdict(response).unwrap();
        assert_eq!(v.completeness, 1);
    }

    #[test]
    fn test_parse_verdict_missing_field() {
        let response = r#"{"clarity": 4, "empathy": 3, "overall": 4}"#;
        assert!(parse_verdict(response).is_err());
    }

    #[test]
    fn test_parse_verdict_out_of_range() {
        let response =
            r#"{"clarity": 9, "empathy": 3, "completeness": 4, "overall": 4, "notes": ""}"#;
        assert!(parse_verdict(response).is_err());

        let response =
            r#"{"clarity": 0, "empathy": 3, "completeness": 4, "overall": 4, "notes": ""}"#;
        assert!(parse_verdict(response).is_err());
    }

    #[test]
    fn test_parse_verdict_non_integer() {
        let response =
            r#"{"clarity": "four", "empathy": 3, "completeness": 4, "overall": 4, "notes": ""}"#;
        assert!(parse_verdict(response).is_err());
    }

    #[test]
    fn test_parse_verdict_notes_optional() {
        let v = parse_verdict(r#"{"clarity": 3, "empathy": 3, "completeness": 3, "overall": 3}"#)
            .unwrap();
        assert_eq!(v.notes, "");
    }

    #[test]
    fn test_extract_json_handles_braces_in_strings() {
        let text = r#"prefix {"notes": "uses {braces} inside", "clarity": 1} suffix"#;
        let obj = extract_json_object(text).unwrap();
        assert!(obj.starts_with('{'));
        assert!(obj.ends_with('}'));
        assert!(obj.contains("{braces}"));
    }

    #[test]
    fn test_extract_json_none_without_object() {
        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn test_prompt_mentions_all_dimensions() {
        let prompt = build_prompt("Thanks for your patience.");
        for dim in ["clarity", "empathy", "completeness", "overall"] {
            assert!(prompt.contains(dim), "missing dimension: {}", dim);
        }
        assert!(prompt.contains("Thanks for your patience."));
    }
}
