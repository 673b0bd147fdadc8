//! Tool registration and dispatch.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use atlassian_auth::AuthContext;
use serde::Serialize;
use serde_json::Value;

use crate::types::{McpError, McpResult, ToolDefinition};

/// Boxed future returned by a tool handler.
pub type ToolFuture = Pin<Box<dyn Future<Output = McpResult<Value>> + Send>>;

/// An invocable tool. Receives the request's credentials and the raw arguments.
pub trait ToolHandler: Send + Sync {
    fn call(&self, auth: AuthContext, arguments: Value) -> ToolFuture;
}

impl<F, Fut> ToolHandler for F
where
    F: Fn(AuthContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<Value>> + Send + 'static,
{
    fn call(&self, auth: AuthContext, arguments: Value) -> ToolFuture {
        Box::pin(self(auth, arguments))
    }
}

/// Introspectable description of a registered tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub read_only: bool,
}

impl ToolMetadata {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            input_schema: self.input_schema.clone(),
        }
    }
}

struct RegisteredTool {
    metadata: ToolMetadata,
    handler: Arc<dyn ToolHandler>,
}

/// Name-keyed tool table. Filled during startup, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A second registration under the same name replaces the first.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        read_only: bool,
        handler: F,
    ) where
        F: Fn(AuthContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Value>> + Send + 'static,
    {
        let name = name.into();
        let metadata = ToolMetadata {
            name: name.clone(),
            description: description.into(),
            input_schema,
            read_only,
        };
        let replaced = self
            .tools
            .insert(
                name.clone(),
                RegisteredTool {
                    metadata,
                    handler: Arc::new(handler),
                },
            )
            .is_some();
        if replaced {
            tracing::debug!("Replaced tool registration: {name}");
        }
    }

    /// Register a read-only tool.
    pub fn register_read_only<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) where
        F: Fn(AuthContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Value>> + Send + 'static,
    {
        self.register(name, description, input_schema, true, handler);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn metadata_for(&self, name: &str) -> Option<&ToolMetadata> {
        self.tools.get(name).map(|t| &t.metadata)
    }

    /// Every tool's metadata, ordered by name.
    pub fn all_metadata(&self) -> Vec<&ToolMetadata> {
        self.tools.values().map(|t| &t.metadata).collect()
    }

    /// Protocol definitions, optionally restricted to read-only tools.
    pub fn definitions(&self, read_only_only: bool) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|t| !read_only_only || t.metadata.read_only)
            .map(|t| t.metadata.definition())
            .collect()
    }

    /// Invoke a tool by name and wait for its result.
    ///
    /// The handler runs on its own task, so a panic inside it surfaces as an internal
    /// error for this call only.
    pub async fn invoke(&self, name: &str, auth: &AuthContext, params: Value) -> McpResult<Value> {
        let handler = self
            .tools
            .get(name)
            .map(|t| t.handler.clone())
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;
        tokio::spawn(handler.call(auth.clone(), params))
            .await
            .map_err(|e| McpError::InternalError(format!("Tool {name} did not complete: {e}")))?
    }
}
