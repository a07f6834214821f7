//! Toolmesh - compiled API tools for LLM agents
//!
//! Turns OpenAPI-derived operation schemas into executable tools with
//! derived parameters, renders them for several agent frameworks, and
//! finds the right tools for a natural-language query via a remote
//! similarity service with a local lexical fallback.

pub mod config;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod server;
pub mod state;
pub mod tools;
pub mod transport;

// Re-export key types for convenience
pub use config::Config;
pub use discovery::{normalize_action_name, DiscoveryClient, LocalRanker};
pub use error::{AppError, Result};
pub use handlers::router;
pub use ingestion::{load_tools, load_tools_file};
pub use state::AppState;
pub use tools::{
    CallContext, DerivationRegistry, ParameterTransformer, PreparedRequest, RenderTarget, Tool,
    ToolDefinition, ToolOutcome, ToolSet, ToolSetConfig,
};
pub use transport::{HttpTransport, Transport, TransportResponse};
