//! Ingestion of compiled tool definitions.
//!
//! Definitions are produced upstream from OpenAPI documents and stored as
//! JSON, one document per connector.

pub mod loader;
pub mod types;

pub use loader::{load_tools, load_tools_file, validate_definition};
pub use types::ToolDocument;
