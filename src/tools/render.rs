//! Agent-framework renderings of a compiled tool.
//!
//! Every target is a projection of the same canonical schema, and every
//! rendering carries the fingerprint of the tool's parameter specs, so two
//! renderings of one tool can always be traced back to the same source.

use crate::error::{AppError, Result};
use crate::tools::params::ToolDefinition;
use crate::tools::tool::{CallContext, Tool, ToolOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderTarget {
    /// Function-calling tool: `{"type": "function", "function": {...}}`.
    OpenAi,
    /// `{"name", "description", "input_schema"}`.
    Anthropic,
    /// Model Context Protocol tool listing entry.
    Mcp,
}

impl RenderTarget {
    pub const ALL: [RenderTarget; 3] = [RenderTarget::OpenAi, RenderTarget::Anthropic, RenderTarget::Mcp];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "openai" | "open_ai" | "function" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "mcp" => Some(Self::Mcp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedTool {
    pub target: RenderTarget,
    pub schema: Value,
    pub fingerprint: String,
}

/// SHA-256 over the tool name and its ordered parameter specs, hex encoded.
pub fn fingerprint(definition: &ToolDefinition) -> String {
    let mut hasher = Sha256::new();
    hasher.update(definition.name.as_bytes());
    hasher.update(b"\n");

    for spec in &definition.execute.params {
        hasher.update(spec.name.as_bytes());
        hasher.update(b"|");
        hasher.update(spec.location.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(spec.param_type.as_bytes());
        hasher.update(b"|");
        hasher.update(spec.derived_from.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\n");
    }

    hex::encode(hasher.finalize())
}

/// The JSON schema all targets project from. Declared params missing from
/// the loaded schema are filled in from their spec.
pub fn canonical_schema(definition: &ToolDefinition) -> Value {
    let mut schema = match &definition.parameters {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    schema
        .entry("type")
        .or_insert_with(|| Value::String("object".into()));

    let mut properties = match schema.remove("properties") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for spec in &definition.execute.params {
        properties
            .entry(spec.name.clone())
            .or_insert_with(|| json!({ "type": spec.param_type }));
    }
    schema.insert("properties".into(), Value::Object(properties));

    Value::Object(schema)
}

pub fn render(definition: &ToolDefinition, target: RenderTarget) -> RenderedTool {
    let parameters = canonical_schema(definition);
    let schema = match target {
        RenderTarget::OpenAi => json!({
            "type": "function",
            "function": {
                "name": definition.name,
                "description": definition.description,
                "parameters": parameters,
            }
        }),
        RenderTarget::Anthropic => json!({
            "name": definition.name,
            "description": definition.description,
            "input_schema": parameters,
        }),
        RenderTarget::Mcp => json!({
            "name": definition.name,
            "description": definition.description,
            "inputSchema": parameters,
        }),
    };

    RenderedTool {
        target,
        schema,
        fingerprint: fingerprint(definition),
    }
}

/// Pulls the argument bag out of a target-shaped tool call.
///
/// OpenAI sends arguments as a JSON-encoded string (an object is accepted
/// too). Anthropic sends the `input` object. MCP sends `tools/call` params,
/// `{"name": ..., "arguments": {...}}`.
pub fn decode_arguments(target: RenderTarget, tool_name: &str, raw: Value) -> Result<Value> {
    match target {
        RenderTarget::OpenAi => match raw {
            Value::String(_) | Value::Object(_) => Ok(raw),
            Value::Null => Ok(Value::Object(Map::new())),
            _ => Err(AppError::Validation(
                "function arguments must be a JSON string or object".to_string(),
            )),
        },
        RenderTarget::Anthropic => match raw {
            Value::Object(_) => Ok(raw),
            Value::Null => Ok(Value::Object(Map::new())),
            _ => Err(AppError::Validation("tool input must be an object".to_string())),
        },
        RenderTarget::Mcp => {
            let Value::Object(mut params) = raw else {
                return Err(AppError::Validation(
                    "tools/call params must be an object".to_string(),
                ));
            };
            if let Some(name) = params.get("name").and_then(Value::as_str) {
                if name != tool_name {
                    return Err(AppError::Validation(format!(
                        "tools/call for '{}' routed to '{}'",
                        name, tool_name
                    )));
                }
            }
            Ok(params
                .remove("arguments")
                .unwrap_or_else(|| Value::Object(Map::new())))
        }
    }
}

impl Tool {
    pub fn render(&self, target: RenderTarget) -> RenderedTool {
        render(self.definition(), target)
    }

    /// Executes a call arriving in `target`'s wire shape.
    pub async fn call_rendered(
        &self,
        target: RenderTarget,
        raw: Value,
        ctx: &CallContext,
    ) -> Result<ToolOutcome> {
        let args = decode_arguments(target, self.name(), raw)?;
        self.execute(args, ctx).await
    }
}
