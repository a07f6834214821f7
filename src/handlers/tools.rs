use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::tools::render::{RenderTarget, RenderedTool};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// `openai`, `anthropic` or `mcp`. Defaults to `mcp`.
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub target: RenderTarget,
    pub tools: Vec<RenderedTool>,
}

fn parse_target(raw: Option<&str>) -> Result<RenderTarget> {
    match raw {
        None => Ok(RenderTarget::Mcp),
        Some(raw) => RenderTarget::parse(raw)
            .ok_or_else(|| AppError::Validation(format!("Unknown render target '{}'", raw))),
    }
}

/// GET /tools - Every static tool rendered for one agent framework.
pub async fn list_tools_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ToolListResponse>> {
    let target = parse_target(query.target.as_deref())?;
    let tools = state.toolset.tools().map(|t| t.render(target)).collect();
    Ok(Json(ToolListResponse { target, tools }))
}

/// GET /tools/:name - One tool rendered for one agent framework.
pub async fn get_tool_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<RenderedTool>> {
    let target = parse_target(query.target.as_deref())?;
    let tool = state.toolset.resolve_tool(&name, &[]).await?;
    Ok(Json(tool.render(target)))
}
