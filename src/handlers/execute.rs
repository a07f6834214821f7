use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::tools::render::RenderTarget;
use crate::tools::request::{HeaderBag, PreparedRequest};
use crate::tools::tool::{CallContext, ToolOutcome};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Object, or JSON-encoded object string.
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub headers: HeaderBag,
    #[serde(default)]
    pub account_ids: Vec<String>,
    /// Wire shape of `arguments` when it comes straight from an agent
    /// framework's tool call.
    #[serde(default)]
    pub target: Option<RenderTarget>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    DryRun { dry_run: bool, request: PreparedRequest },
    Result { result: Value },
}

/// POST /tools/:name/execute - Run a tool, or build its request without
/// sending it.
pub async fn execute_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>> {
    let tool = state.toolset.resolve_tool(&name, &request.account_ids).await?;
    let ctx = CallContext {
        headers: request.headers,
        dry_run: request.dry_run,
    };
    let arguments = match request.arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };

    let outcome = match request.target {
        Some(target) => tool.call_rendered(target, arguments, &ctx).await,
        None => tool.execute(arguments, &ctx).await,
    }
    .map_err(|e| match e {
        // Malformed arguments are the caller's fault here.
        AppError::Config(msg) => AppError::Validation(msg),
        other => other,
    })?;

    tracing::info!(tool = %name, dry_run = ctx.dry_run, "Tool executed");

    Ok(Json(match outcome {
        ToolOutcome::DryRun(request) => ExecuteResponse::DryRun {
            dry_run: true,
            request,
        },
        ToolOutcome::Response(result) => ExecuteResponse::Result { result },
    }))
}
