//! Tool compilation and invocation.

pub mod compiler;
pub mod derivation;
pub mod params;
pub mod render;
pub mod request;
pub mod tool;
pub mod toolset;

pub use derivation::{DerivationRegistry, ParameterTransformer};
pub use params::{BodyType, ExecuteConfig, ParameterLocation, ToolDefinition, ToolParameterSpec};
pub use render::{RenderTarget, RenderedTool};
pub use request::{HeaderBag, PreparedRequest};
pub use tool::{CallContext, Dispatch, Tool, ToolOutcome};
pub use toolset::{
    Credentials, SearchSource, SearchToolsOptions, StaticCatalog, ToolCatalog, ToolSet,
    ToolSetConfig,
};
