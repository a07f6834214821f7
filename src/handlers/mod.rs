pub mod execute;
pub mod health;
pub mod search;
pub mod tools;

pub use execute::execute_handler;
pub use health::{health_handler, ready_handler};
pub use search::search_handler;
pub use tools::{get_tool_handler, list_tools_handler};

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// API routes without middleware or the metrics endpoint.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", post(search_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/:name", get(get_tool_handler))
        .route("/tools/:name/execute", post(execute_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}
