//! A compiled, credentialed collection of tools plus discovery over it.

use crate::discovery::client::{ActionMatch, ActionSearchOptions, DiscoveryClient};
use crate::discovery::local::{LocalRanker, DEFAULT_LIMIT};
use crate::error::{AppError, Result};
use crate::ingestion::validate_definition;
use crate::tools::compiler::augment;
use crate::tools::derivation::DerivationRegistry;
use crate::tools::params::ToolDefinition;
use crate::tools::request::{merge_header, merge_headers, HeaderBag};
use crate::tools::tool::{Dispatch, Tool};
use crate::transport::{HttpTransport, Transport};
use async_trait::async_trait;
use base64::Engine;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

const ACCOUNT_HEADER: &str = "x-account-id";
/// Remote hits are oversampled before connector filtering drops some.
const OVERSAMPLE_FACTOR: usize = 3;

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: Basic base64(api_key + ":")`.
    Basic { api_key: String },
    Bearer { token: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { .. } => f.write_str("Credentials::Basic(***)"),
            Credentials::Bearer { .. } => f.write_str("Credentials::Bearer(***)"),
        }
    }
}

impl Credentials {
    pub fn authorization(&self) -> String {
        match self {
            Credentials::Basic { api_key } => format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode(format!("{}:", api_key))
            ),
            Credentials::Bearer { token } => format!("Bearer {}", token),
        }
    }

    fn secret(&self) -> &str {
        match self {
            Credentials::Basic { api_key } => api_key,
            Credentials::Bearer { token } => token,
        }
    }
}

/// Construction-time settings for a [`ToolSet`].
#[derive(Debug, Clone)]
pub struct ToolSetConfig {
    pub credentials: Option<Credentials>,
    pub account_id: Option<String>,
    /// Replaces the scheme and host of every static tool URL.
    pub base_url: Option<String>,
    /// When set, catalog tools are dispatched through this RPC bridge.
    pub rpc_endpoint: Option<String>,
    pub discovery_url: Option<String>,
    pub headers: HeaderBag,
    pub discovery_timeout: Duration,
    pub http_timeout: Duration,
    pub fallback_to_local: bool,
}

impl Default for ToolSetConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            account_id: None,
            base_url: None,
            rpc_endpoint: None,
            discovery_url: None,
            headers: HeaderBag::new(),
            discovery_timeout: Duration::from_secs(10),
            http_timeout: Duration::from_secs(60),
            fallback_to_local: true,
        }
    }
}

impl ToolSetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::Basic {
            api_key: api_key.into(),
        });
        self
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::Bearer {
            token: token.into(),
        });
        self
    }

    #[must_use]
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_rpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.rpc_endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        merge_header(&mut self.headers, name, value);
        self
    }

    #[must_use]
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_fallback_to_local(mut self, enabled: bool) -> Self {
        self.fallback_to_local = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        match &self.credentials {
            None => {
                return Err(AppError::Config(
                    "an API key or access token is required".to_string(),
                ))
            }
            Some(credentials) if credentials.secret().trim().is_empty() => {
                return Err(AppError::Config("credentials must not be empty".to_string()))
            }
            Some(_) => {}
        }

        for (field, value) in [
            ("base_url", &self.base_url),
            ("rpc_endpoint", &self.rpc_endpoint),
            ("discovery_url", &self.discovery_url),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw).map_err(|e| {
                    AppError::Config(format!("{} '{}' is not a valid URL: {}", field, raw, e))
                })?;
            }
        }

        if let Some(account_id) = &self.account_id {
            if account_id.trim().is_empty() {
                return Err(AppError::Config("account id must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Tool-set level headers: auth, then account scoping, then extras.
    fn base_headers(&self, account_id: Option<&str>) -> HeaderBag {
        let mut headers = HeaderBag::new();
        if let Some(credentials) = &self.credentials {
            headers.insert("Authorization".to_string(), credentials.authorization());
        }
        if let Some(account_id) = account_id.or(self.account_id.as_deref()) {
            headers.insert(ACCOUNT_HEADER.to_string(), account_id.to_string());
        }
        merge_headers(&mut headers, &self.headers);
        if let Some(account_id) = account_id {
            merge_header(&mut headers, ACCOUNT_HEADER, account_id);
        }
        headers
    }
}

/// Source of account-scoped tool definitions.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Definitions reachable for `account_id`, or for the default account
    /// when `None`.
    async fn list_tools(&self, account_id: Option<&str>) -> Result<Vec<ToolDefinition>>;
}

/// In-memory catalog, one definition list per linked account.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    default: Vec<ToolDefinition>,
    accounts: HashMap<String, Vec<ToolDefinition>>,
}

impl StaticCatalog {
    pub fn new(default: Vec<ToolDefinition>) -> Self {
        Self {
            default,
            accounts: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_account(mut self, account_id: impl Into<String>, tools: Vec<ToolDefinition>) -> Self {
        self.accounts.insert(account_id.into(), tools);
        self
    }
}

#[async_trait]
impl ToolCatalog for StaticCatalog {
    async fn list_tools(&self, account_id: Option<&str>) -> Result<Vec<ToolDefinition>> {
        Ok(match account_id {
            Some(id) => self.accounts.get(id).cloned().unwrap_or_default(),
            None => self.default.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchToolsOptions {
    pub account_ids: Vec<String>,
    pub connector: Option<String>,
    pub top_k: Option<usize>,
    pub min_score: Option<f64>,
    /// Overrides the tool set's configured fallback policy.
    pub fallback_to_local: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Remote,
    Local,
}

#[derive(Debug, Clone)]
pub struct ScoredTool {
    pub tool: Tool,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ToolSearchResult {
    pub tools: Vec<ScoredTool>,
    pub source: SearchSource,
}

pub struct ToolSetBuilder {
    config: ToolSetConfig,
    definitions: Vec<ToolDefinition>,
    registry: Option<DerivationRegistry>,
    transport: Option<Arc<dyn Transport>>,
    catalog: Option<Arc<dyn ToolCatalog>>,
}

impl ToolSetBuilder {
    #[must_use]
    pub fn definitions(mut self, definitions: Vec<ToolDefinition>) -> Self {
        self.definitions = definitions;
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: DerivationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Validates the config and compiles the static definitions.
    ///
    /// Definitions are checked structurally before augmentation, whatever
    /// their origin, so a malformed one fails the build with a load error.
    pub fn build(self) -> Result<ToolSet> {
        self.config.validate()?;
        for definition in &self.definitions {
            validate_definition(definition)?;
        }

        let registry = Arc::new(self.registry.unwrap_or_else(DerivationRegistry::with_defaults));
        let transport: Arc<dyn Transport> = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new(self.config.http_timeout)));

        let mut definitions = self.definitions;
        if let Some(base_url) = &self.config.base_url {
            for definition in definitions.iter_mut() {
                definition.execute.url = rebase_url(&definition.execute.url, base_url);
            }
        }
        let injected = augment(&mut definitions, &registry);

        let base_headers = self.config.base_headers(None);
        let mut tools = IndexMap::with_capacity(definitions.len());
        for definition in definitions {
            let name = definition.name.clone();
            if tools.contains_key(&name) {
                return Err(AppError::Load(format!("duplicate tool name '{}'", name)));
            }
            let tool = Tool::new(definition, registry.clone(), transport.clone(), Dispatch::Http)
                .with_base_headers(base_headers.clone());
            tools.insert(name, tool);
        }

        let discovery = self.config.discovery_url.as_ref().map(|url| {
            DiscoveryClient::new(url.clone(), transport.clone())
                .with_headers(base_headers.clone())
                .with_timeout(self.config.discovery_timeout)
        });

        tracing::info!(
            tools = tools.len(),
            derived_params = injected,
            discovery = discovery.is_some(),
            catalog = self.catalog.is_some(),
            "Tool set compiled"
        );

        Ok(ToolSet {
            config: self.config,
            tools,
            registry,
            transport,
            catalog: self.catalog,
            discovery,
            ranker: LocalRanker::new(),
        })
    }
}

pub struct ToolSet {
    config: ToolSetConfig,
    tools: IndexMap<String, Tool>,
    registry: Arc<DerivationRegistry>,
    transport: Arc<dyn Transport>,
    catalog: Option<Arc<dyn ToolCatalog>>,
    discovery: Option<DiscoveryClient>,
    ranker: LocalRanker,
}

impl ToolSet {
    pub fn builder(config: ToolSetConfig) -> ToolSetBuilder {
        ToolSetBuilder {
            config,
            definitions: Vec::new(),
            registry: None,
            transport: None,
            catalog: None,
        }
    }

    /// Empty static tool set; tools come from a catalog or are added later
    /// through the builder.
    pub fn new(config: ToolSetConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn from_definitions(config: ToolSetConfig, definitions: Vec<ToolDefinition>) -> Result<Self> {
        Self::builder(config).definitions(definitions).build()
    }

    pub fn config(&self) -> &ToolSetConfig {
        &self.config
    }

    pub fn registry(&self) -> &DerivationRegistry {
        &self.registry
    }

    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools reachable for `account_ids`.
    ///
    /// Without a catalog this is the static set. With one, each account is
    /// listed separately and its tools carry that account's scoping header.
    /// The first tool seen under a name wins.
    pub async fn fetch_tools(&self, account_ids: &[String]) -> Result<Vec<Tool>> {
        let Some(catalog) = &self.catalog else {
            return Ok(self.tools.values().cloned().collect());
        };

        let accounts: Vec<Option<&str>> = if account_ids.is_empty() {
            vec![self.config.account_id.as_deref()]
        } else {
            account_ids.iter().map(|id| Some(id.as_str())).collect()
        };

        let dispatch = match &self.config.rpc_endpoint {
            Some(endpoint) => Dispatch::Rpc {
                endpoint: endpoint.clone(),
            },
            None => Dispatch::Http,
        };

        let mut fetched: IndexMap<String, Tool> = IndexMap::new();
        for account in accounts {
            let mut definitions = catalog.list_tools(account).await.map_err(|e| match e {
                AppError::Load(_) => e,
                other => AppError::Load(format!("listing tools failed: {}", other)),
            })?;
            for definition in &definitions {
                validate_definition(definition)?;
            }
            augment(&mut definitions, &self.registry);

            let headers = self.config.base_headers(account);
            for definition in definitions {
                if fetched.contains_key(&definition.name) {
                    continue;
                }
                let name = definition.name.clone();
                let tool = Tool::new(
                    definition,
                    self.registry.clone(),
                    self.transport.clone(),
                    dispatch.clone(),
                )
                .with_base_headers(headers.clone());
                fetched.insert(name, tool);
            }
        }

        tracing::debug!(
            accounts = account_ids.len(),
            tools = fetched.len(),
            "Fetched account tools"
        );
        Ok(fetched.into_values().collect())
    }

    /// Looks a tool up in the static set, then among the account tools.
    pub async fn resolve_tool(&self, name: &str, account_ids: &[String]) -> Result<Tool> {
        if let Some(tool) = self.get_tool(name) {
            return Ok(tool.clone());
        }
        if self.catalog.is_some() {
            if let Some(tool) = self
                .fetch_tools(account_ids)
                .await?
                .into_iter()
                .find(|t| t.name() == name)
            {
                return Ok(tool);
            }
        }
        Err(AppError::NotFound(format!("tool '{}' not found", name)))
    }

    /// Lower-cased connectors of every tool reachable for `account_ids`.
    pub async fn available_connectors(&self, account_ids: &[String]) -> Result<BTreeSet<String>> {
        Ok(self
            .fetch_tools(account_ids)
            .await?
            .iter()
            .map(Tool::connector)
            .collect())
    }

    pub async fn search_action_names(
        &self,
        query: &str,
        options: &ActionSearchOptions,
    ) -> Result<Vec<ActionMatch>> {
        match &self.discovery {
            Some(client) => client.search_action_names(query, options).await,
            None => Err(AppError::Discovery(
                "no discovery endpoint configured".to_string(),
            )),
        }
    }

    pub async fn search_tools(&self, query: &str, options: &SearchToolsOptions) -> Result<Vec<Tool>> {
        Ok(self
            .search_tools_detailed(query, options)
            .await?
            .tools
            .into_iter()
            .map(|scored| scored.tool)
            .collect())
    }

    /// Ranked executable tools for `query`, restricted to the connectors
    /// reachable for `options.account_ids`.
    pub async fn search_tools_detailed(
        &self,
        query: &str,
        options: &SearchToolsOptions,
    ) -> Result<ToolSearchResult> {
        let reachable = self.fetch_tools(&options.account_ids).await?;
        let connector = options.connector.as_ref().map(|c| c.to_lowercase());
        let candidates: IndexMap<String, Tool> = reachable
            .into_iter()
            .filter(|t| connector.as_ref().map_or(true, |c| t.connector() == *c))
            .map(|t| (t.name().to_string(), t))
            .collect();
        let connectors: BTreeSet<String> = candidates.values().map(Tool::connector).collect();
        let limit = options.top_k.unwrap_or(DEFAULT_LIMIT);

        let Some(client) = &self.discovery else {
            return Ok(self.rank_locally(query, &candidates, limit));
        };

        let remote = client
            .search_action_names(
                query,
                &ActionSearchOptions {
                    connector: connector.clone(),
                    top_k: Some(limit.saturating_mul(OVERSAMPLE_FACTOR)),
                    min_score: options.min_score,
                },
            )
            .await;

        match remote {
            Ok(matches) => {
                let tools = matches
                    .into_iter()
                    .filter(|m| connectors.contains(&m.connector_key))
                    .filter_map(|m| {
                        candidates.get(&m.action_name).map(|tool| ScoredTool {
                            tool: tool.clone(),
                            score: m.similarity_score,
                        })
                    })
                    .take(limit)
                    .collect();
                Ok(ToolSearchResult {
                    tools,
                    source: SearchSource::Remote,
                })
            }
            Err(err) => {
                let fallback = options
                    .fallback_to_local
                    .unwrap_or(self.config.fallback_to_local);
                if !fallback {
                    tracing::error!(error = %err, "Discovery failed and local fallback is disabled");
                    return Err(err);
                }
                tracing::warn!(error = %err, "Discovery failed, ranking locally");
                metrics::counter!("discovery_fallback_total").increment(1);
                Ok(self.rank_locally(query, &candidates, limit))
            }
        }
    }

    fn rank_locally(&self, query: &str, candidates: &IndexMap<String, Tool>, limit: usize) -> ToolSearchResult {
        let tools = self
            .ranker
            .rank(query, candidates.values().map(Tool::definition), limit)
            .into_iter()
            .filter_map(|ranked| {
                candidates.get(&ranked.name).map(|tool| ScoredTool {
                    tool: tool.clone(),
                    score: ranked.score,
                })
            })
            .collect();
        ToolSearchResult {
            tools,
            source: SearchSource::Local,
        }
    }
}

/// Swaps the scheme and authority of `url` for `base`, keeping the path
/// template untouched. Relative URLs are appended to `base`.
fn rebase_url(url: &str, base: &str) -> String {
    let base = base.trim_end_matches('/');
    let rest = match url.find("://") {
        Some(scheme_end) => {
            let after = &url[scheme_end + 3..];
            after.find('/').map_or("", |slash| &after[slash..])
        }
        None => url,
    };
    if rest.is_empty() || rest.starts_with('/') {
        format!("{}{}", base, rest)
    } else {
        format!("{}/{}", base, rest)
    }
}
