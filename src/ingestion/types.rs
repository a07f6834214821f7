//! On-disk shapes accepted by the loader.

use serde::Deserialize;
use serde_json::Value;

/// A connector's compiled operations as stored on disk.
///
/// Definitions are kept as raw values so that a malformed entry can be
/// reported by index and name.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDocument {
    /// Applied to every definition that does not declare its own connector.
    #[serde(default)]
    pub connector: Option<String>,
    pub tools: Vec<Value>,
}

impl ToolDocument {
    pub fn anonymous(tools: Vec<Value>) -> Self {
        Self {
            connector: None,
            tools,
        }
    }
}
