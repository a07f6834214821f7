//! Derivation registry: synthesizes extra parameters from one source value.
//!
//! Each registered source parameter maps to a [`ParameterTransformer`], an
//! ordered set of named transforms. Transforms run independently and report
//! a per-field outcome, so one failing transform only drops its own field.

use base64::Engine;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Pure transform from a source value to one derived value.
pub type TransformFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// A single transform failed. Always recovered by omitting the field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("derivation of '{field}' from '{source_param}' failed: {reason}")]
pub struct DerivationFieldError {
    pub source_param: String,
    pub field: String,
    pub reason: String,
}

/// Named transforms keyed by target field name.
#[derive(Clone, Default)]
pub struct ParameterTransformer {
    transforms: IndexMap<String, TransformFn>,
}

impl ParameterTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_transform<F>(mut self, target: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.transforms.insert(target.into(), Arc::new(transform));
        self
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl fmt::Debug for ParameterTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterTransformer")
            .field("targets", &self.transforms.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of one transform for one source value.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedField {
    pub source: String,
    pub field: String,
    pub outcome: Result<Value, DerivationFieldError>,
}

/// Ordered list of (source parameter, transformer) pairs.
///
/// Registering an existing source replaces its transformer and moves it to
/// the end, so when two sources derive the same field the most recently
/// registered one is applied last and wins.
#[derive(Debug, Clone, Default)]
pub struct DerivationRegistry {
    entries: Vec<(String, ParameterTransformer)>,
}

impl DerivationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in `file_path` transformer.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("file_path", file_upload_transformer());
        registry
    }

    /// Stores or replaces the transformer for `source`.
    pub fn register(&mut self, source: impl Into<String>, transformer: ParameterTransformer) {
        let source = source.into();
        if let Some(pos) = self.entries.iter().position(|(s, _)| *s == source) {
            tracing::debug!(source = %source, "Replacing registered parameter transformer");
            self.entries.remove(pos);
        }
        self.entries.push((source, transformer));
    }

    pub fn get(&self, source: &str) -> Option<&ParameterTransformer> {
        self.entries
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, t)| t)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.get(source).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterTransformer)> {
        self.entries.iter().map(|(s, t)| (s.as_str(), t))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every transform of `source` against `value`.
    pub fn derive(&self, source: &str, value: &Value) -> Vec<DerivedField> {
        let Some(transformer) = self.get(source) else {
            return Vec::new();
        };

        transformer
            .transforms
            .iter()
            .map(|(field, transform)| DerivedField {
                source: source.to_string(),
                field: field.clone(),
                outcome: transform(value).map_err(|reason| DerivationFieldError {
                    source_param: source.to_string(),
                    field: field.clone(),
                    reason,
                }),
            })
            .collect()
    }

    /// Derives fields for every registered source present in `values`,
    /// in registration order.
    pub fn derive_all(&self, values: &Map<String, Value>) -> Vec<DerivedField> {
        self.entries
            .iter()
            .filter_map(|(source, _)| values.get(source).map(|v| (source, v)))
            .filter(|(_, value)| !value.is_null())
            .flat_map(|(source, value)| self.derive(source, value))
            .collect()
    }
}

fn source_path(value: &Value) -> Result<&Path, String> {
    match value.as_str() {
        Some(raw) if !raw.trim().is_empty() => Ok(Path::new(raw)),
        Some(_) => Err("file path is empty".to_string()),
        None => Err(format!("expected a string file path, got {}", value)),
    }
}

/// `file_path` -> `content` (base64 file bytes), `name` (file name) and
/// `file_format` (lower-cased extension).
pub fn file_upload_transformer() -> ParameterTransformer {
    ParameterTransformer::new()
        .with_transform("content", |value| {
            let path = source_path(value)?;
            let bytes = std::fs::read(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            ))
        })
        .with_transform("name", |value| {
            let path = source_path(value)?;
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| Value::String(n.to_string()))
                .ok_or_else(|| format!("{} has no file name", path.display()))
        })
        .with_transform("file_format", |value| {
            let path = source_path(value)?;
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| Value::String(e.to_lowercase()))
                .ok_or_else(|| format!("{} has no extension", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn upper_and_fail() -> ParameterTransformer {
        ParameterTransformer::new()
            .with_transform("upper", |v| {
                Ok(json!(v.as_str().unwrap_or_default().to_uppercase()))
            })
            .with_transform("broken", |_| Err("boom".to_string()))
    }

    #[test]
    fn test_failing_transform_does_not_abort_siblings() {
        let mut registry = DerivationRegistry::new();
        registry.register("word", upper_and_fail());

        let fields = registry.derive("word", &json!("hello"));

        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field, "upper");
        assert_eq!(fields[0].outcome, Ok(json!("HELLO")));
        let err = fields[1].outcome.clone().unwrap_err();
        assert_eq!(err.field, "broken");
        assert_eq!(err.reason, "boom");
    }

    #[test]
    fn test_register_replaces_existing_key() {
        let mut registry = DerivationRegistry::new();
        registry.register("word", upper_and_fail());
        registry.register(
            "word",
            ParameterTransformer::new().with_transform("len", |v| {
                Ok(json!(v.as_str().map(str::len).unwrap_or(0)))
            }),
        );

        let targets: Vec<&str> = registry.get("word").unwrap().targets().collect();
        assert_eq!(targets, vec!["len"]);
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn test_replaced_source_moves_last() {
        let mut registry = DerivationRegistry::new();
        registry.register("a", ParameterTransformer::new());
        registry.register("b", ParameterTransformer::new());
        registry.register("a", ParameterTransformer::new());

        let order: Vec<&str> = registry.iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_derive_unknown_source_is_empty() {
        let registry = DerivationRegistry::new();
        assert!(registry.derive("missing", &json!("x")).is_empty());
    }

    #[test]
    fn test_derive_all_skips_absent_and_null_sources() {
        let mut registry = DerivationRegistry::new();
        registry.register("word", upper_and_fail());
        registry.register("other", upper_and_fail());

        let values = json!({ "word": "hi", "other": null });
        let fields = registry.derive_all(values.as_object().unwrap());

        assert_eq!(fields.len(), 2);
        assert!(fields.iter().all(|f| f.source == "word"));
    }

    #[test]
    fn test_file_upload_transformer_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Report.PDF");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello")
            .unwrap();

        let registry = DerivationRegistry::with_defaults();
        let fields = registry.derive("file_path", &json!(path.to_str().unwrap()));
        let by_name: std::collections::HashMap<_, _> = fields
            .into_iter()
            .map(|f| (f.field, f.outcome.unwrap()))
            .collect();

        assert_eq!(by_name["content"], json!("aGVsbG8="));
        assert_eq!(by_name["name"], json!("Report.PDF"));
        assert_eq!(by_name["file_format"], json!("pdf"));
    }

    #[test]
    fn test_file_upload_missing_file_keeps_name_and_format() {
        let registry = DerivationRegistry::with_defaults();
        let fields = registry.derive("file_path", &json!("/definitely/not/here.txt"));

        let ok: Vec<&str> = fields
            .iter()
            .filter(|f| f.outcome.is_ok())
            .map(|f| f.field.as_str())
            .collect();
        assert_eq!(ok, vec!["name", "file_format"]);
    }

    #[test]
    fn test_file_upload_rejects_non_string() {
        let registry = DerivationRegistry::with_defaults();
        let fields = registry.derive("file_path", &json!(42));
        assert!(fields.iter().all(|f| f.outcome.is_err()));
    }
}
