//! Loading compiled tool definitions from JSON.
//!
//! Accepted layouts: `{"connector": "...", "tools": [...]}`, a bare array
//! of definitions, or a `{"result": {"tools": [...]}}` listing response.
//! Unlike search results, definitions are all-or-nothing: one malformed
//! definition fails the whole load.

use crate::error::{AppError, Result};
use crate::ingestion::types::ToolDocument;
use crate::tools::params::{ParameterLocation, ToolDefinition};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

pub fn load_tools_file(path: &Path) -> Result<Vec<ToolDefinition>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Load(format!("cannot read {}: {}", path.display(), e)))?;
    let json: Value = serde_json::from_str(&raw)
        .map_err(|e| AppError::Load(format!("{} is not valid JSON: {}", path.display(), e)))?;

    let tools = load_tools(&json)?;
    tracing::info!(path = %path.display(), tools = tools.len(), "Loaded tool definitions");
    Ok(tools)
}

pub fn load_tools(json: &Value) -> Result<Vec<ToolDefinition>> {
    let document = extract_document(json)?;
    let mut definitions = Vec::with_capacity(document.tools.len());

    for (idx, raw) in document.tools.into_iter().enumerate() {
        let label = raw
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", idx));

        let mut definition: ToolDefinition = serde_json::from_value(raw)
            .map_err(|e| AppError::Load(format!("tool {}: {}", label, e)))?;
        if definition.connector.is_none() {
            definition.connector = document.connector.clone();
        }
        validate_definition(&definition)?;
        definitions.push(definition);
    }

    tracing::debug!(
        connector = document.connector.as_deref().unwrap_or("-"),
        tools = definitions.len(),
        "Tool document parsed"
    );
    Ok(definitions)
}

fn extract_document(json: &Value) -> Result<ToolDocument> {
    if let Value::Array(tools) = json {
        return Ok(ToolDocument::anonymous(tools.clone()));
    }
    if json.get("tools").is_some() {
        return serde_json::from_value(json.clone())
            .map_err(|e| AppError::Load(format!("invalid tool document: {}", e)));
    }
    json.get("result")
        .and_then(|r| r.get("tools"))
        .and_then(Value::as_array)
        .map(|tools| ToolDocument::anonymous(tools.clone()))
        .ok_or_else(|| {
            AppError::Load("expected a tool array, a 'tools' document or 'result.tools'".into())
        })
}

/// Structural checks serde cannot express.
pub fn validate_definition(definition: &ToolDefinition) -> Result<()> {
    let fail = |reason: String| Err(AppError::Load(format!("tool {}: {}", definition.name, reason)));

    if definition.name.trim().is_empty() {
        return Err(AppError::Load("tool with empty name".into()));
    }
    if definition.execute.url.trim().is_empty() {
        return fail("execute.url is empty".into());
    }
    if definition.execute.method.trim().is_empty() {
        return fail("execute.method is empty".into());
    }

    let mut seen = HashSet::new();
    for param in &definition.execute.params {
        if !seen.insert(param.name.as_str()) {
            return fail(format!("parameter '{}' declared twice", param.name));
        }
        if param.location == ParameterLocation::Path
            && !definition.execute.url.contains(&format!("{{{}}}", param.name))
        {
            return fail(format!("path parameter '{}' has no placeholder in the URL", param.name));
        }
    }
    for param in &definition.execute.params {
        if let Some(source) = &param.derived_from {
            if !seen.contains(source.as_str()) {
                return fail(format!(
                    "'{}' is derived from undeclared parameter '{}'",
                    param.name, source
                ));
            }
        }
    }
    Ok(())
}
