//! Request compilation: turns a flat value bag into an outgoing request.
//!
//! The same [`PreparedRequest`] is returned by dry runs and handed to the
//! transport on live calls, so both paths always build identical requests.

use crate::error::{AppError, Result};
use crate::tools::derivation::DerivationRegistry;
use crate::tools::params::{BodyType, ParameterLocation, ToolParameterSpec};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Header names are compared case-insensitively, stored as given.
pub type HeaderBag = BTreeMap<String, String>;

/// Fully constructed outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderBag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Final parameter bag after derivation, before partitioning.
    #[serde(rename = "mappedParams")]
    pub mapped_params: Map<String, Value>,
}

/// Values split across request locations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partitioned {
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
    pub headers: HeaderBag,
    pub body: Map<String, Value>,
}

/// Accepts an object or a JSON-encoded object string.
pub fn parse_arguments(args: Value) -> Result<Map<String, Value>> {
    match args {
        Value::Object(map) => Ok(map),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(AppError::Config(format!(
                "Tool arguments must decode to a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(AppError::Config(format!(
                "Tool arguments are not valid JSON: {}",
                e
            ))),
        },
        other => Err(AppError::Config(format!(
            "Tool arguments must be an object or JSON string, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Adds derived values for every registered source present in `values`.
///
/// A failed transform is logged and its field left out; siblings and the
/// source value are kept.
pub fn apply_derivations(
    tool: &str,
    values: &mut Map<String, Value>,
    registry: &DerivationRegistry,
) -> usize {
    let mut failures = 0;
    for derived in registry.derive_all(values) {
        match derived.outcome {
            Ok(value) => {
                values.insert(derived.field, value);
            }
            Err(err) => {
                failures += 1;
                tracing::warn!(
                    tool,
                    source = %err.source_param,
                    field = %err.field,
                    reason = %err.reason,
                    "Derived parameter skipped"
                );
            }
        }
    }
    failures
}

/// Splits values by declared location. Undeclared names go to the body.
pub fn partition(values: &Map<String, Value>, params: &[ToolParameterSpec]) -> Partitioned {
    let mut out = Partitioned::default();
    for (name, value) in values {
        let location = params
            .iter()
            .find(|p| p.name == *name)
            .map(|p| p.location)
            .unwrap_or(ParameterLocation::Body);

        match location {
            ParameterLocation::Path => {
                out.path.insert(name.clone(), value.clone());
            }
            ParameterLocation::Query => {
                out.query.insert(name.clone(), value.clone());
            }
            ParameterLocation::Header => {
                if !value.is_null() {
                    merge_header(&mut out.headers, name, &stringify(value));
                }
            }
            ParameterLocation::Body => {
                out.body.insert(name.clone(), value.clone());
            }
        }
    }
    out
}

/// Inserts a header, replacing any existing entry with the same name
/// regardless of case.
pub fn merge_header(headers: &mut HeaderBag, name: &str, value: &str) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.to_string());
}

/// Layers `overlay` on top of `base`.
pub fn merge_headers(base: &mut HeaderBag, overlay: &HeaderBag) {
    for (name, value) in overlay {
        merge_header(base, name, value);
    }
}

pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitutes `{name}` placeholders with percent-encoded path values.
pub fn render_url(template: &str, path: &Map<String, Value>) -> Result<String> {
    let mut url = template.to_string();
    for (name, value) in path {
        // A null value leaves the placeholder in place and counts as missing.
        if value.is_null() {
            continue;
        }
        let placeholder = format!("{{{}}}", name);
        url = url.replace(&placeholder, &urlencoding::encode(&stringify(value)));
    }

    if let Some(start) = url.find('{') {
        if let Some(len) = url[start..].find('}') {
            return Err(AppError::Validation(format!(
                "Missing path parameter '{}'",
                &url[start + 1..start + len]
            )));
        }
    }
    Ok(url)
}

/// Flattens nested values into `key[sub]=value` pairs. Arrays repeat the key.
pub fn flatten_pairs(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_pairs(&format!("{}[{}]", prefix, key), nested, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(_) | Value::Array(_) => {
                        out.push((prefix.to_string(), item.to_string()))
                    }
                    _ => flatten_pairs(prefix, item, out),
                }
            }
        }
        scalar => out.push((prefix.to_string(), stringify(scalar))),
    }
}

/// Percent-encoded `application/x-www-form-urlencoded` string for a bag.
pub fn encode_pairs(values: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in values {
        flatten_pairs(key, value, &mut pairs);
    }
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

pub fn append_query(url: &str, query: &Map<String, Value>) -> String {
    let encoded = encode_pairs(query);
    if encoded.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, encoded)
}

pub fn serialize_body(body: &Map<String, Value>, body_type: BodyType) -> Result<Option<String>> {
    if body.is_empty() {
        return Ok(None);
    }
    let encoded = match body_type {
        BodyType::Json => serde_json::to_string(body)?,
        BodyType::Form => encode_pairs(body),
    };
    Ok(Some(encoded))
}

/// Envelope posted to the RPC bridge. The bridge negotiates its own
/// credentials, so `Authorization` never travels inside the envelope.
pub fn rpc_envelope(action: &str, parts: &Partitioned, headers: &HeaderBag) -> Value {
    let forwarded: Map<String, Value> = headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("authorization"))
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();

    let mut envelope = json!({
        "action": action,
        "body": parts.body,
        "headers": forwarded,
    });
    if !parts.path.is_empty() {
        envelope["path"] = Value::Object(parts.path.clone());
    }
    if !parts.query.is_empty() {
        envelope["query"] = Value::Object(parts.query.clone());
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<ToolParameterSpec> {
        vec![
            ToolParameterSpec::new("id", ParameterLocation::Path),
            ToolParameterSpec::new("filter", ParameterLocation::Query),
            ToolParameterSpec::new("x-trace", ParameterLocation::Header),
            ToolParameterSpec::new("name", ParameterLocation::Body),
        ]
    }

    #[test]
    fn test_parse_arguments_accepts_json_string() {
        let map = parse_arguments(json!(r#"{"id":"1"}"#)).unwrap();
        assert_eq!(map["id"], "1");
    }

    #[test]
    fn test_parse_arguments_rejects_non_object() {
        assert!(matches!(
            parse_arguments(json!(5)),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            parse_arguments(json!("[1,2]")),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            parse_arguments(json!("not json")),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_partition_routes_each_location() {
        let values = json!({
            "id": "123",
            "filter": { "status": "active" },
            "x-trace": 7,
            "name": "Ada",
            "undeclared": true
        });
        let parts = partition(values.as_object().unwrap(), &specs());

        assert_eq!(parts.path["id"], "123");
        assert_eq!(parts.query["filter"]["status"], "active");
        assert_eq!(parts.headers["x-trace"], "7");
        assert_eq!(parts.body["name"], "Ada");
        assert_eq!(parts.body["undeclared"], true);
        assert!(!parts.body.contains_key("id"));
    }

    #[test]
    fn test_render_url_substitutes_and_encodes() {
        let path = json!({ "id": "a b/c" });
        let url = render_url("/test/{id}", path.as_object().unwrap()).unwrap();
        assert_eq!(url, "/test/a%20b%2Fc");
    }

    #[test]
    fn test_render_url_missing_placeholder_is_error() {
        let err = render_url("/test/{id}", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn test_render_url_null_value_is_missing() {
        let path = json!({ "id": null });
        let err = render_url("/test/{id}", path.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn test_query_flattens_nested_objects() {
        let query = json!({
            "filter": { "updated_after": "2024-01-01", "type": { "code": "x" } },
            "page_size": 25,
            "fields": ["id", "name"]
        });
        let url = append_query("/employees", query.as_object().unwrap());
        assert_eq!(
            url,
            "/employees?fields=id&fields=name&filter%5Btype%5D%5Bcode%5D=x&filter%5Bupdated_after%5D=2024-01-01&page_size=25"
        );
    }

    #[test]
    fn test_append_query_respects_existing_query_string() {
        let query = json!({ "a": 1 });
        assert_eq!(
            append_query("/x?raw=true", query.as_object().unwrap()),
            "/x?raw=true&a=1"
        );
        assert_eq!(append_query("/x", &Map::new()), "/x");
    }

    #[test]
    fn test_serialize_body_variants() {
        let body = json!({ "name": "Ada", "age": 36 });
        let body = body.as_object().unwrap();
        assert_eq!(
            serialize_body(body, BodyType::Json).unwrap().unwrap(),
            r#"{"age":36,"name":"Ada"}"#
        );
        assert_eq!(
            serialize_body(body, BodyType::Form).unwrap().unwrap(),
            "age=36&name=Ada"
        );
        assert_eq!(serialize_body(&Map::new(), BodyType::Json).unwrap(), None);
    }

    #[test]
    fn test_merge_header_is_case_insensitive() {
        let mut headers = HeaderBag::new();
        merge_header(&mut headers, "X-Account-Id", "one");
        merge_header(&mut headers, "x-account-id", "two");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-account-id"], "two");
    }

    #[test]
    fn test_rpc_envelope_strips_authorization() {
        let values = json!({ "id": "9", "name": "Ada" });
        let parts = partition(values.as_object().unwrap(), &specs());
        let mut headers = HeaderBag::new();
        headers.insert("Authorization".into(), "Basic abc".into());
        headers.insert("x-account-id".into(), "acc".into());

        let envelope = rpc_envelope("hris_update_employee", &parts, &headers);

        assert_eq!(envelope["action"], "hris_update_employee");
        assert_eq!(envelope["body"]["name"], "Ada");
        assert_eq!(envelope["path"]["id"], "9");
        assert_eq!(envelope["headers"]["x-account-id"], "acc");
        assert!(envelope["headers"].get("Authorization").is_none());
        assert!(envelope.get("query").is_none());
    }
}
