//! Parameter model describing a tool's callable surface.
//!
//! These are passive data shapes. A [`ToolDefinition`] is produced once per
//! operation (usually loaded from JSON by the ingestion layer) and only
//! touched afterwards by the single derivation-augmentation pass.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Where a parameter lands in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Body,
}

impl Default for ParameterLocation {
    fn default() -> Self {
        Self::Body
    }
}

impl ParameterLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameterSpec {
    pub name: String,
    #[serde(default)]
    pub location: ParameterLocation,
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    /// Name of the source parameter this value is computed from.
    /// Never supplied directly by the caller when set.
    #[serde(default, rename = "derivedFrom", skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,
}

fn default_param_type() -> String {
    "string".to_string()
}

impl ToolParameterSpec {
    pub fn new(name: impl Into<String>, location: ParameterLocation) -> Self {
        Self {
            name: name.into(),
            location,
            param_type: default_param_type(),
            derived_from: None,
        }
    }

    /// Builds a derived parameter slot.
    pub fn derived(
        name: impl Into<String>,
        location: ParameterLocation,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            param_type: default_param_type(),
            derived_from: Some(source.into()),
        }
    }

    #[must_use]
    pub fn with_type(mut self, param_type: impl Into<String>) -> Self {
        self.param_type = param_type.into();
        self
    }

    pub fn is_derived(&self) -> bool {
        self.derived_from.is_some()
    }
}

/// How the body bag is serialized on direct HTTP calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyType {
    Json,
    Form,
}

impl Default for BodyType {
    fn default() -> Self {
        Self::Json
    }
}

impl BodyType {
    pub fn content_type(self) -> &'static str {
        match self {
            BodyType::Json => "application/json",
            BodyType::Form => "application/x-www-form-urlencoded",
        }
    }
}

/// Execution half of a tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteConfig {
    pub method: String,
    /// URL template with `{name}` placeholders for PATH parameters.
    pub url: String,
    #[serde(default, rename = "bodyType")]
    pub body_type: BodyType,
    #[serde(default)]
    pub params: Vec<ToolParameterSpec>,
}

impl ExecuteConfig {
    pub fn param(&self, name: &str) -> Option<&ToolParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn location_of(&self, name: &str) -> Option<ParameterLocation> {
        self.param(name).map(|p| p.location)
    }
}

/// Classification used by the local fallback ranker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A compiled operation: name, description, JSON-Schema parameters and
/// the execute configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-Schema object: `{"type": "object", "properties": {...}, "required": [...]}`.
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
    pub execute: ExecuteConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    #[serde(default)]
    pub metadata: ToolMetadata,
}

pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl ToolDefinition {
    /// Connector that owns this action. Falls back to the name prefix
    /// (`hris_list_employees` -> `hris`).
    pub fn connector(&self) -> String {
        match &self.connector {
            Some(connector) => connector.to_lowercase(),
            None => self
                .name
                .split('_')
                .next()
                .unwrap_or_default()
                .to_lowercase(),
        }
    }

    /// Adds a property to the JSON schema unless one with that name exists.
    /// Returns whether the property was inserted.
    pub(crate) fn insert_property(&mut self, name: &str, property: Value) -> bool {
        let mut schema = match std::mem::take(&mut self.parameters) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        schema
            .entry("type")
            .or_insert_with(|| Value::String("object".into()));
        let mut properties = match schema.remove("properties") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let inserted = !properties.contains_key(name);
        if inserted {
            properties.insert(name.to_string(), property);
        }

        schema.insert("properties".into(), Value::Object(properties));
        self.parameters = Value::Object(schema);
        inserted
    }

    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_definition_with_defaults() {
        let def: ToolDefinition = serde_json::from_value(json!({
            "name": "hris_get_employee",
            "execute": {
                "method": "GET",
                "url": "https://api.example.com/employees/{id}",
                "params": [{ "name": "id", "location": "path" }]
            }
        }))
        .unwrap();

        assert_eq!(def.execute.body_type, BodyType::Json);
        assert_eq!(def.execute.params[0].param_type, "string");
        assert_eq!(def.execute.location_of("id"), Some(ParameterLocation::Path));
        assert_eq!(def.parameters["type"], "object");
    }

    #[test]
    fn test_connector_from_name_prefix() {
        let def: ToolDefinition = serde_json::from_value(json!({
            "name": "BambooHR_list_employees",
            "execute": { "method": "GET", "url": "/employees" }
        }))
        .unwrap();
        assert_eq!(def.connector(), "bamboohr");
    }

    #[test]
    fn test_explicit_connector_wins() {
        let def: ToolDefinition = serde_json::from_value(json!({
            "name": "list_employees",
            "connector": "Workday",
            "execute": { "method": "GET", "url": "/employees" }
        }))
        .unwrap();
        assert_eq!(def.connector(), "workday");
    }

    #[test]
    fn test_insert_property_repairs_schema() {
        let mut def: ToolDefinition = serde_json::from_value(json!({
            "name": "x_y",
            "parameters": null,
            "execute": { "method": "GET", "url": "/" }
        }))
        .unwrap();
        assert!(def.insert_property("a", json!({ "type": "string" })));
        assert!(!def.insert_property("a", json!({ "type": "number" })));
        assert_eq!(def.parameters["type"], "object");
        assert_eq!(def.parameters["properties"]["a"]["type"], "string");
    }
}
