use crate::config::Config;
use crate::error::Result;
use crate::ingestion::load_tools_file;
use crate::tools::toolset::ToolSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Application state shared across all request handlers.
pub struct AppState {
    pub toolset: Arc<ToolSet>,
    /// Set once the listener is bound and serving; cleared when draining.
    pub ready: AtomicBool,
}

impl AppState {
    /// Loads the configured tool definitions and compiles the tool set.
    ///
    /// A missing `TOOLS_PATH` yields an empty static set; search then only
    /// covers what the discovery service returns for catalog tools.
    pub fn new(config: &Config) -> Result<Self> {
        let definitions = match &config.tools_path {
            Some(path) => load_tools_file(path)?,
            None => {
                tracing::warn!("TOOLS_PATH not set, serving an empty tool set");
                Vec::new()
            }
        };

        let toolset = ToolSet::from_definitions(config.toolset_config(), definitions)?;
        Ok(Self::from_toolset(toolset))
    }

    /// Starts not ready. The server marks the state ready once it accepts
    /// connections.
    pub fn from_toolset(toolset: ToolSet) -> Self {
        Self {
            toolset: Arc::new(toolset),
            ready: AtomicBool::new(false),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Check if the service is ready to handle requests.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
