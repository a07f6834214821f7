//! Tool discovery endpoint.
//!
//! Queries the similarity service when one is configured and falls back to
//! local lexical ranking according to the tool set's policy (overridable
//! per request).

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::tools::toolset::{SearchSource, SearchToolsOptions};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub account_ids: Vec<String>,
    #[serde(default)]
    pub connector: Option<String>,
    /// Applies to remote similarity scores only.
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub fallback_to_local: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub source: SearchSource,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub name: String,
    pub connector: String,
    pub description: String,
    /// Similarity for remote results, lexical score for local ones.
    pub score: f64,
}

/// POST /search - Find tools relevant to a natural language query.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start_time = std::time::Instant::now();

    if request.query.trim().is_empty() {
        return Err(AppError::Validation("Query cannot be empty".to_string()));
    }
    if request.top_k == 0 {
        return Err(AppError::Validation("top_k must be at least 1".to_string()));
    }

    let options = SearchToolsOptions {
        account_ids: request.account_ids,
        connector: request.connector,
        top_k: Some(request.top_k),
        min_score: request.min_score,
        fallback_to_local: request.fallback_to_local,
    };
    let found = state
        .toolset
        .search_tools_detailed(&request.query, &options)
        .await?;

    let results: Vec<SearchResult> = found
        .tools
        .into_iter()
        .map(|scored| SearchResult {
            name: scored.tool.name().to_string(),
            connector: scored.tool.connector(),
            description: scored.tool.description().to_string(),
            score: scored.score,
        })
        .collect();

    let total_time = start_time.elapsed();
    tracing::info!(
        query = %request.query,
        top_k = request.top_k,
        results = results.len(),
        source = ?found.source,
        total_ms = total_time.as_millis() as u64,
        "Search completed"
    );
    metrics::counter!("search_requests_total").increment(1);
    metrics::histogram!("search_latency_ms").record(total_time.as_millis() as f64);

    Ok(Json(SearchResponse {
        results,
        source: found.source,
    }))
}
