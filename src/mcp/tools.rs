//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::models::{CallToolResult, ErrorData, ToolAnnotations, ToolInfo};
use crate::transport::Peer;

/// Errors a tool handler can report
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

impl From<ToolError> for ErrorData {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidArguments(_) | ToolError::NotFound(_) => {
                ErrorData::invalid_params(err.to_string())
            }
            ToolError::Failed(_) => ErrorData::internal_error(err.to_string()),
        }
    }
}

/// Decode tool arguments into a typed struct
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    // Clients may omit `arguments` entirely
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "greet")
    pub name: String,

    /// Display name
    pub title: Option<String>,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    pub annotations: Option<ToolAnnotations>,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    /// Listing entry for `tools/list`
    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            annotations: self.annotations.clone(),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments.
    ///
    /// `peer` pushes notifications to the calling session before the result.
    async fn execute(&self, args: Value, peer: &Peer) -> Result<CallToolResult, ToolError>;
}

/// Registry for all MCP tools
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get all tools, sorted by name
    pub fn all(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        peer: &Peer,
    ) -> Result<CallToolResult, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        tool.handler.execute(args, peer).await
    }
}
