//! Client for the remote similarity-search service.
//!
//! Raw results carry versioned action identifiers; this client normalizes
//! them to canonical names, keeps the best-scoring hit per name and applies
//! score/limit filtering. Connector scoping against the caller's accounts
//! happens in the tool set, which knows which tools are reachable.

use crate::discovery::normalize::normalize_action_name;
use crate::error::{AppError, Result};
use crate::tools::request::{merge_header, HeaderBag, PreparedRequest};
use crate::transport::Transport;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub connector: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ActionSearchOptions {
    pub connector: Option<String>,
    pub top_k: Option<usize>,
    pub min_score: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    connector: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
}

/// One raw hit as returned over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchResult {
    pub action_name: String,
    pub connector_key: String,
    pub similarity_score: f64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SemanticSearchResult>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub query: String,
}

/// A de-duplicated hit keyed by canonical action name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMatch {
    pub action_name: String,
    pub connector_key: String,
    pub similarity_score: f64,
    pub label: String,
    pub description: String,
}

impl From<SemanticSearchResult> for ActionMatch {
    fn from(result: SemanticSearchResult) -> Self {
        Self {
            action_name: normalize_action_name(&result.action_name),
            connector_key: result.connector_key.to_lowercase(),
            similarity_score: result.similarity_score,
            label: result.label,
            description: result.description,
        }
    }
}

/// Normalizes names and keeps one hit per canonical name: the highest
/// score, or the first one seen on a tie. First-seen order is preserved.
pub fn dedupe_results(results: Vec<SemanticSearchResult>) -> Vec<ActionMatch> {
    let mut best: IndexMap<String, ActionMatch> = IndexMap::with_capacity(results.len());
    for result in results {
        let candidate = ActionMatch::from(result);
        match best.get_mut(&candidate.action_name) {
            Some(existing) if existing.similarity_score < candidate.similarity_score => {
                *existing = candidate;
            }
            Some(_) => {}
            None => {
                best.insert(candidate.action_name.clone(), candidate);
            }
        }
    }
    best.into_values().collect()
}

/// Dedup, drop hits below `min_score`, sort by score descending, truncate.
pub fn select_actions(
    results: Vec<SemanticSearchResult>,
    min_score: Option<f64>,
    top_k: Option<usize>,
) -> Vec<ActionMatch> {
    let mut matches = dedupe_results(results);
    if let Some(min) = min_score {
        matches.retain(|m| m.similarity_score >= min);
    }
    sort_by_score(&mut matches);
    if let Some(k) = top_k {
        matches.truncate(k);
    }
    matches
}

pub(crate) fn sort_by_score(matches: &mut [ActionMatch]) {
    matches.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

pub struct DiscoveryClient {
    endpoint: String,
    transport: Arc<dyn Transport>,
    headers: HeaderBag,
    timeout: Duration,
}

impl DiscoveryClient {
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            headers: HeaderBag::new(),
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderBag) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse> {
        self.search_with_cancel(query, options, &CancellationToken::new())
            .await
    }

    /// Queries the similarity service. The call ends early when `cancel`
    /// fires or the configured timeout elapses; both surface as
    /// [`AppError::Discovery`]. On timeout `cancel` is triggered as well so
    /// callers sharing the token observe it.
    pub async fn search_with_cancel(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let request = self.build_request(query, options)?;
        let start = Instant::now();
        metrics::counter!("discovery_requests_total").increment(1);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AppError::Discovery("search cancelled".to_string()));
            }
            _ = tokio::time::sleep(self.timeout) => {
                cancel.cancel();
                return Err(AppError::Discovery(format!(
                    "search timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
            sent = self.transport.send(&request) => {
                sent.map_err(|e| AppError::Discovery(e.to_string()))?
            }
        };

        metrics::histogram!("discovery_latency_ms").record(start.elapsed().as_millis() as f64);

        if !response.is_success() {
            return Err(AppError::Discovery(format!(
                "search service returned {}: {}",
                response.status, response.body
            )));
        }

        let parsed: SearchResponse = serde_json::from_str(&response.body).map_err(|e| {
            AppError::Discovery(format!("malformed search response: {}", e))
        })?;

        tracing::debug!(
            query,
            results = parsed.results.len(),
            total_count = parsed.total_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Semantic search completed"
        );

        Ok(parsed)
    }

    /// Canonical action names for `query`, never below `min_score`.
    pub async fn search_action_names(
        &self,
        query: &str,
        options: &ActionSearchOptions,
    ) -> Result<Vec<ActionMatch>> {
        let response = self
            .search(
                query,
                &SearchOptions {
                    connector: options.connector.clone(),
                    top_k: options.top_k,
                },
            )
            .await?;

        Ok(select_actions(
            response.results,
            options.min_score,
            options.top_k,
        ))
    }

    fn build_request(&self, query: &str, options: &SearchOptions) -> Result<PreparedRequest> {
        let payload = SearchRequest {
            query,
            connector: options.connector.as_deref(),
            top_k: options.top_k,
        };

        let mut headers = self.headers.clone();
        merge_header(&mut headers, "Content-Type", "application/json");

        Ok(PreparedRequest {
            method: "POST".to_string(),
            url: self.endpoint.clone(),
            headers,
            body: Some(serde_json::to_string(&payload)?),
            mapped_params: Default::default(),
        })
    }
}
