//! # desklens CLI (`desk`)
//!
//! The `desk` binary is the primary interface for desklens. It provides
//! commands for database initialization, CSV import, tier labeling, quality
//! scoring, embedding-index maintenance, search, warehouse ETL, and the
//! health-check HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! desk --config ./config/desk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `desk init` | Create the SQLite database and run schema migrations |
//! | `desk import tickets <file.csv>` | Import a ticket export |
//! | `desk tier backfill` | Label tickets L1/L2/L3 by keyword heuristics |
//! | `desk score run` | Score customer-facing comments with the local LLM |
//! | `desk index pending` | Backfill missing or stale ticket embeddings |
//! | `desk search "<query>"` | Search tickets (keyword/semantic/hybrid) |
//! | `desk etl run` | Copy the store into the PostgreSQL warehouse |
//! | `desk get <id>` | Print a ticket with comments and scores |
//! | `desk stats` | Database overview, tier distribution, FCR |
//! | `desk serve` | Start the health-check and search HTTP server |

mod config;
mod db;
mod embedding;
mod etl;
mod get;
mod import;
mod index_cmd;
mod migrate;
mod models;
mod quality;
mod search;
mod server;
mod stats;
mod tier;
mod warehouse;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// desklens CLI — a ServiceDesk ticket analytics toolkit.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/desk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "desk",
    about = "desklens — ServiceDesk ticket analytics: import, tiering, quality scoring, search, warehouse ETL",
    version,
    long_about = "desklens imports ServiceDesk ticket exports into a local SQLite store and runs \
    the analytics backfills around them: keyword-based support-tier labeling (L1/L2/L3), LLM \
    quality scoring of customer-facing comments, an embedding index with hybrid search, and an \
    ETL into a PostgreSQL reporting warehouse."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/desk.toml`. All database, tiering, embedding,
    /// LLM, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/desk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (tickets,
    /// comments, timesheet_entries, quality_scores, tickets_fts, embeddings,
    /// ticket_vectors, checkpoints). Idempotent — running it multiple times
    /// is safe.
    Init,

    /// Import a CSV export into the store.
    ///
    /// Rows are upserted on their external identifier; unchanged rows
    /// (detected by content hash) are skipped and malformed rows are
    /// reported without aborting the run.
    Import {
        /// Entity to import: `tickets`, `comments`, or `timesheet`.
        entity: String,

        /// Path to the CSV file (with a header row).
        file: PathBuf,
    },

    /// Label tickets with support tiers (L1/L2/L3).
    Tier {
        #[command(subcommand)]
        action: TierAction,
    },

    /// Score customer-facing comments with the configured LLM.
    Score {
        #[command(subcommand)]
        action: ScoreAction,
    },

    /// Manage the ticket embedding index.
    ///
    /// Requires an embedding provider (openai or ollama) to be configured.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Search tickets.
    ///
    /// Queries the store using the specified search mode and returns ranked
    /// results with scores and snippets.
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `keyword` (FTS5), `semantic` (vector), or `hybrid`
        /// (weighted merge). Semantic and hybrid require an embedding
        /// provider to be configured.
        #[arg(long, default_value = "keyword")]
        mode: String,

        /// Filter results to a specific status (e.g., `Open`, `Closed`).
        #[arg(long)]
        status: Option<String>,

        /// Filter results to a specific tier (`L1`, `L2`, `L3`).
        #[arg(long)]
        tier: Option<String>,

        /// Only return tickets updated on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Copy the store into the PostgreSQL reporting warehouse.
    Etl {
        #[command(subcommand)]
        action: EtlAction,
    },

    /// Print a ticket with its comments, hours, and quality scores.
    Get {
        /// Ticket identifier (as found in the export).
        id: String,
    },

    /// Print database statistics: counts, tier distribution, coverage, FCR.
    Stats,

    /// Start the HTTP server (`/health`, `/ready`, `POST /search`).
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

/// Tier labeling subcommands.
#[derive(Subcommand)]
enum TierAction {
    /// Label unlabeled tickets using the keyword classifier.
    ///
    /// Reads each ticket's title, description, resolution, and root cause,
    /// matches against the configured keyword lists (L3 first, then L2),
    /// and writes the tier column. Tickets matching neither list get L1.
    Backfill {
        /// Recompute tiers for all tickets, not just unlabeled ones.
        #[arg(long)]
        full: bool,

        /// Maximum number of tickets to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Show would-be tier counts without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the current tier distribution.
    Show,
}

/// Quality scoring subcommands.
#[derive(Subcommand)]
enum ScoreAction {
    /// Score unscored customer-facing comments.
    ///
    /// Picks the most recent public comments without a score for the
    /// configured model and asks the LLM to rate each against the rubric
    /// (clarity, empathy, completeness, overall).
    Run {
        /// Number of comments to sample (overrides config `llm.sample_size`).
        #[arg(long)]
        sample_size: Option<usize>,

        /// Show the pending count without calling the LLM.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print rubric averages and the lowest-scoring comments.
    Report {
        /// How many of the lowest-scoring comments to list.
        #[arg(long, default_value = "10")]
        worst: usize,
    },
}

/// Embedding index subcommands.
#[derive(Subcommand)]
enum IndexAction {
    /// Embed tickets that are missing or have stale embeddings.
    Pending {
        /// Maximum number of tickets to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (number of texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models or dimensions.
    Rebuild {
        /// Override the batch size from config (number of texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

/// Warehouse ETL subcommands.
#[derive(Subcommand)]
enum EtlAction {
    /// Create the warehouse reporting schema. Idempotent.
    Init,

    /// Copy tickets, comments, and timesheet entries into the warehouse.
    ///
    /// Incremental by default: only tickets updated since the last run are
    /// copied, tracked by the `etl` checkpoint.
    Run {
        /// Ignore the checkpoint — copy all tickets from scratch.
        #[arg(long)]
        full: bool,

        /// Show row counts without writing to the warehouse.
        #[arg(long)]
        dry_run: bool,

        /// Only copy tickets updated on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only copy tickets updated on or before this date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Maximum number of tickets to copy.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { entity, file } => {
            import::run_import(&cfg, &entity, &file).await?;
        }
        Commands::Tier { action } => match action {
            TierAction::Backfill {
                full,
                limit,
                dry_run,
            } => {
                tier::run_backfill(&cfg, full, limit, dry_run).await?;
            }
            TierAction::Show => {
                tier::run_show(&cfg).await?;
            }
        },
        Commands::Score { action } => match action {
            ScoreAction::Run {
                sample_size,
                dry_run,
            } => {
                quality::run_score(&cfg, sample_size, dry_run).await?;
            }
            ScoreAction::Report { worst } => {
                quality::run_report(&cfg, worst).await?;
            }
        },
        Commands::Index { action } => match action {
            IndexAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                index_cmd::run_index_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            IndexAction::Rebuild { batch_size } => {
                index_cmd::run_index_rebuild(&cfg, batch_size).await?;
            }
        },
        Commands::Search {
            query,
            mode,
            status,
            tier,
            since,
            limit,
        } => {
            let params = search::SearchParams {
                query,
                mode,
                status,
                tier,
                since,
                limit,
            };
            search::run_search(&cfg, &params).await?;
        }
        Commands::Etl { action } => match action {
            EtlAction::Init => {
                warehouse::run_migrations(&cfg).await?;
                println!("Warehouse schema initialized successfully.");
            }
            EtlAction::Run {
                full,
                dry_run,
                since,
                until,
                limit,
            } => {
                etl::run_etl(&cfg, full, dry_run, since, until, limit).await?;
            }
        },
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
