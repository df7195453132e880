//! Ticket embedding index maintenance (`desk index`).
//!
//! Embeds each ticket's searchable text (title, description, resolution,
//! root cause) into the vector store. Staleness is detected by comparing a
//! SHA-256 hash of the text against the hash recorded at embedding time, so
//! re-imported tickets get re-embedded and unchanged ones are skipped.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;

/// Embed tickets that are missing vectors or whose text changed.
pub async fn run_index_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let model_name = provider.model_name().to_string();
    let pool = db::connect(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let pending = find_pending_tickets(&pool, &model_name, limit).await?;

    if dry_run {
        println!("index pending (dry-run)");
        println!("  tickets needing embeddings: {}", pending.len());
        pool.close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("index pending");
        println!("  all tickets up to date");
        pool.close().await;
        return Ok(());
    }

    let (embedded, failed) =
        embed_batches(config, &pool, &model_name, provider.dims(), &pending, batch_size).await?;

    println!("index pending");
    println!("  total pending: {}", pending.len());
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

/// Delete all vectors and regenerate the index from scratch.
pub async fn run_index_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let model_name = provider.model_name().to_string();
    let pool = db::connect(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    sqlx::query("DELETE FROM ticket_vectors")
        .execute(&pool)
        .await?;
    sqlx::query("DELETE FROM embeddings").execute(&pool).await?;

    println!("index rebuild — cleared existing embeddings");

    let all = find_pending_tickets(&pool, &model_name, None).await?;

    if all.is_empty() {
        println!("  no tickets to embed");
        pool.close().await;
        return Ok(());
    }

    let (embedded, failed) =
        embed_batches(config, &pool, &model_name, provider.dims(), &all, batch_size).await?;

    println!("index rebuild");
    println!("  total tickets: {}", all.len());
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

async fn embed_batches(
    config: &Config,
    pool: &SqlitePool,
    model_name: &str,
    dims: usize,
    pending: &[PendingTicket],
    batch_size: usize,
) -> Result<(u64, u64)> {
    let mut embedded = 0u64;
    let mut failed = 0u64;

    for batch in pending.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match embedding::embed_texts(&config.embedding, &texts).await {
            Ok(vectors) => {
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    let blob = embedding::vec_to_blob(vec);
                    upsert_embedding(pool, &item.ticket_id, model_name, dims, &item.text_hash, &blob)
                        .await?;
                    embedded += 1;
                }
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
                failed += batch.len() as u64;
            }
        }
    }

    Ok((embedded, failed))
}

struct PendingTicket {
    ticket_id: String,
    text: String,
    text_hash: String,
}

async fn find_pending_tickets(
    pool: &SqlitePool,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingTicket>> {
    // The FTS table already holds the searchable text, so reuse it rather
    // than re-concatenating fields here. Staleness is decided in Rust by
    // hashing the current text and comparing against the stored hash.
    let rows = sqlx::query(
        r#"
        SELECT f.ticket_id, f.text, e.hash AS stored_hash
        FROM tickets_fts f
        LEFT JOIN embeddings e ON e.ticket_id = f.ticket_id AND e.model = ?
        ORDER BY f.ticket_id
        "#,
    )
    .bind(model)
    .fetch_all(pool)
    .await?;

    let mut results = Vec::new();
    for row in &rows {
        let text: String = row.get("text");
        let text_hash = hash_text(&text);
        let stored: Option<String> = row.get("stored_hash");

        if stored.as_deref() == Some(&text_hash) {
            continue;
        }

        results.push(PendingTicket {
            ticket_id: row.get("ticket_id"),
            text,
            text_hash,
        });

        if let Some(lim) = limit {
            if results.len() >= lim {
                break;
            }
        }
    }

    Ok(results)
}

async fn upsert_embedding(
    pool: &SqlitePool,
    ticket_id: &str,
    model: &str,
    dims: usize,
    text_hash: &str,
    blob: &[u8],
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO embeddings (ticket_id, model, dims, hash, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(ticket_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            hash = excluded.hash,
            created_at = excluded.created_at
        "#,
    )
    .bind(ticket_id)
    .bind(model)
    .bind(dims as i64)
    .bind(text_hash)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO ticket_vectors (ticket_id, embedding)
        VALUES (?, ?)
        ON CONFLICT(ticket_id) DO UPDATE SET
            embedding = excluded.embedding
        "#,
    )
    .bind(ticket_id)
    .bind(blob)
    .execute(pool)
    .await?;

    Ok(())
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
