//! Runtime tool instances.
//!
//! A [`Tool`] is immutable once built. Header overrides never mutate a
//! shared instance: `with_headers` returns a new tool, and per-call headers
//! travel in a [`CallContext`]. Precedence is call > tool > tool set.

use crate::error::{AppError, Result};
use crate::tools::derivation::DerivationRegistry;
use crate::tools::params::{ToolDefinition, ToolParameterSpec};
use crate::tools::request::{
    append_query, apply_derivations, merge_header, merge_headers, parse_arguments, partition,
    render_url, rpc_envelope, serialize_body, HeaderBag, PreparedRequest,
};
use crate::transport::Transport;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// How a tool's call leaves the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Direct HTTP call to the operation's own URL.
    Http,
    /// Envelope posted to a generic RPC bridge.
    Rpc { endpoint: String },
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub headers: HeaderBag,
    pub dry_run: bool,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        merge_header(&mut self.headers, name, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutcome {
    DryRun(PreparedRequest),
    Response(Value),
}

impl ToolOutcome {
    pub fn into_value(self) -> Value {
        match self {
            ToolOutcome::DryRun(request) => {
                serde_json::to_value(request).unwrap_or(Value::Null)
            }
            ToolOutcome::Response(value) => value,
        }
    }
}

#[derive(Clone)]
pub struct Tool {
    definition: Arc<ToolDefinition>,
    registry: Arc<DerivationRegistry>,
    transport: Arc<dyn Transport>,
    dispatch: Dispatch,
    /// Tool-set level headers (credentials, account scoping).
    base_headers: HeaderBag,
    /// Instance defaults, layered over `base_headers`.
    headers: HeaderBag,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.definition.name)
            .field("dispatch", &self.dispatch)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Tool {
    pub fn new(
        definition: ToolDefinition,
        registry: Arc<DerivationRegistry>,
        transport: Arc<dyn Transport>,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            definition: Arc::new(definition),
            registry,
            transport,
            dispatch,
            base_headers: HeaderBag::new(),
            headers: HeaderBag::new(),
        }
    }

    #[must_use]
    pub(crate) fn with_base_headers(mut self, headers: HeaderBag) -> Self {
        self.base_headers = headers;
        self
    }

    /// Copy of this tool whose defaults include `headers`.
    #[must_use]
    pub fn with_headers(&self, headers: &HeaderBag) -> Self {
        let mut tool = self.clone();
        merge_headers(&mut tool.headers, headers);
        tool
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(&self) -> &str {
        &self.definition.description
    }

    pub fn connector(&self) -> String {
        self.definition.connector()
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub fn params(&self) -> &[ToolParameterSpec] {
        &self.definition.execute.params
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Instance-level default headers.
    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    /// Headers a call with `ctx` starts from, before HEADER parameters.
    fn effective_headers(&self, ctx: &CallContext) -> HeaderBag {
        let mut headers = self.base_headers.clone();
        merge_headers(&mut headers, &self.headers);
        merge_headers(&mut headers, &ctx.headers);
        headers
    }

    /// Builds the outgoing request without sending it.
    pub fn prepare(&self, args: Value, ctx: &CallContext) -> Result<PreparedRequest> {
        let mut values = parse_arguments(args)?;
        apply_derivations(self.name(), &mut values, &self.registry);

        let parts = partition(&values, self.params());
        let mut headers = self.effective_headers(ctx);
        merge_headers(&mut headers, &parts.headers);

        let execute = &self.definition.execute;
        let (method, url, body, content_type) = match &self.dispatch {
            Dispatch::Http => {
                let url = append_query(&render_url(&execute.url, &parts.path)?, &parts.query);
                let body = serialize_body(&parts.body, execute.body_type)?;
                (
                    execute.method.to_uppercase(),
                    url,
                    body,
                    execute.body_type.content_type(),
                )
            }
            Dispatch::Rpc { endpoint } => {
                let envelope = rpc_envelope(self.name(), &parts, &headers);
                (
                    "POST".to_string(),
                    endpoint.clone(),
                    Some(serde_json::to_string(&envelope)?),
                    "application/json",
                )
            }
        };

        let has_content_type = headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"));
        if body.is_some() && !has_content_type {
            headers.insert("Content-Type".to_string(), content_type.to_string());
        }

        Ok(PreparedRequest {
            method,
            url,
            headers,
            body,
            mapped_params: values,
        })
    }

    /// Runs the tool. With `ctx.dry_run` the prepared request is returned
    /// and nothing is sent.
    pub async fn execute(&self, args: Value, ctx: &CallContext) -> Result<ToolOutcome> {
        let request = self.prepare(args, ctx)?;

        if ctx.dry_run {
            tracing::debug!(tool = %self.name(), url = %request.url, "Dry run");
            return Ok(ToolOutcome::DryRun(request));
        }

        let response = self.transport.send(&request).await?;
        metrics::counter!("tool_executions_total").increment(1);

        if !response.is_success() {
            tracing::error!(
                tool = %self.name(),
                status = response.status,
                "Tool call failed"
            );
            metrics::counter!("tool_execution_errors_total").increment(1);
            return Err(AppError::Api {
                status: response.status,
                body: response.body,
            });
        }

        tracing::debug!(tool = %self.name(), status = response.status, "Tool call succeeded");
        Ok(ToolOutcome::Response(response.json()))
    }

    /// Live call returning the response body.
    pub async fn call(&self, args: Value) -> Result<Value> {
        Ok(self.execute(args, &CallContext::new()).await?.into_value())
    }

    pub fn dry_run(&self, args: Value) -> Result<PreparedRequest> {
        self.prepare(args, &CallContext::dry_run())
    }
}
