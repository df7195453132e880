//! # desklens
//!
//! A ServiceDesk ticket analytics toolkit.
//!
//! desklens imports ticket exports into a local SQLite store and runs the
//! analytics backfills around them: keyword-based support-tier labeling
//! (L1/L2/L3), LLM quality scoring of customer-facing comments, an
//! embedding index with keyword/semantic/hybrid search, and an ETL into a
//! PostgreSQL reporting warehouse for dashboards.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │ CSV exports  │──▶│   Backfills    │──▶│  SQLite    │
//! │ tickets/     │   │ tier · score  │   │ FTS5+Vec  │
//! │ comments/ts  │   │ index         │   └─────┬─────┘
//! └──────────────┘   └───────────────┘         │
//!                            ┌─────────────────┼─────────────┐
//!                            ▼                 ▼             ▼
//!                      ┌──────────┐      ┌──────────┐  ┌──────────┐
//!                      │   CLI    │      │   HTTP   │  │ Postgres │
//!                      │  (desk)  │      │  server  │  │   ETL    │
//!                      └──────────┘      └──────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! desk init                         # create database
//! desk import tickets export.csv    # load a ticket export
//! desk tier backfill                # label support tiers
//! desk index pending                # generate embeddings
//! desk search "vpn outage" --mode hybrid
//! desk etl init && desk etl run     # fill the reporting warehouse
//! desk serve                        # health checks + search API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`import`] | CSV import for tickets, comments, timesheets |
//! | [`tier`] | L1/L2/L3 keyword classifier and backfill |
//! | [`quality`] | LLM quality scoring for support comments |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index_cmd`] | Embedding index maintenance |
//! | [`search`] | Keyword, semantic, and hybrid search |
//! | [`etl`] | SQLite → PostgreSQL warehouse backfill |
//! | [`warehouse`] | Warehouse connection and schema |
//! | [`server`] | Health checks and search over HTTP |
//! | [`stats`] | Database overview and FCR |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod etl;
pub mod get;
pub mod import;
pub mod index_cmd;
pub mod migrate;
pub mod models;
pub mod quality;
pub mod search;
pub mod server;
pub mod stats;
pub mod tier;
pub mod warehouse;
