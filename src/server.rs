//! HTTP server for health checks and search.
//!
//! # Endpoints
//!
//! | Method | Path      | Description |
//! |--------|-----------|-------------|
//! | `GET`  | `/health` | Liveness check (returns version) |
//! | `GET`  | `/ready`  | Readiness check (probes the database) |
//! | `POST` | `/search` | Ticket search, mirroring the CLI |
//!
//! # Error Contract
//!
//! Error responses use a single envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `embeddings_disabled` (400), `unavailable`
//! (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so dashboards can call
//! the search endpoint directly from the browser.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::search::{search_tickets, SearchParams};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

/// Starts the HTTP server on the address configured in `[server].bind`.
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/search", post(search))
        .layer(cors)
        .with_state(state);

    println!("Listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe: a ready instance can reach its database.
async fn ready(State(state): State<AppState>) -> Response {
    let probe = async {
        let pool = db::connect(&state.config).await?;
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await?;
        pool.close().await;
        anyhow::Ok(())
    };

    match probe.await {
        Ok(()) => Json(json!({ "status": "ready" })).into_response(),
        Err(e) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "unavailable",
            &format!("database not reachable: {}", e),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    since: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

fn default_mode() -> String {
    "keyword".to_string()
}

async fn search(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Response {
    if req.query.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "query must not be empty",
        );
    }

    if (req.mode == "semantic" || req.mode == "hybrid")
        && !state.config.embedding.is_enabled()
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "embeddings_disabled",
            "semantic and hybrid modes require an embedding provider",
        );
    }

    let params = SearchParams {
        query: req.query,
        mode: req.mode,
        status: req.status,
        tier: req.tier,
        since: req.since,
        limit: req.limit,
    };

    match search_tickets(&state.config, &params).await {
        Ok(results) => Json(json!({ "results": results })).into_response(),
        Err(e) => {
            let msg = e.to_string();
            // Input validation errors from the search layer map to 400.
            if msg.starts_with("Unknown search mode") || msg.starts_with("Invalid since date") {
                error_response(StatusCode::BAD_REQUEST, "bad_request", &msg)
            } else {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", &msg)
            }
        }
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message } })),
    )
        .into_response()
}
