//! MCP method dispatch.
//!
//! [`McpServer`] is transport-agnostic: it turns one decoded request into one
//! response message, handing handlers a [`Peer`] for out-of-band
//! notifications.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::resources::{PromptRegistry, PromptTemplate, ResourceRegistry, StaticResource};
use super::tools::{Tool, ToolRegistry};
use crate::models::{
    negotiate_protocol_version, CallToolParams, ErrorData, GetPromptParams, Implementation,
    InitializeParams, InitializeResult, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    ReadResourceParams, ServerCapabilities, SetLevelParams,
};
use crate::transport::Peer;

/// The MCP server: registered tools, resources and prompts
#[derive(Debug, Clone)]
pub struct McpServer {
    info: Implementation,
    instructions: Option<String>,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
}

/// Builder for [`McpServer`]
#[derive(Debug, Clone)]
pub struct McpServerBuilder {
    server: McpServer,
}

impl McpServerBuilder {
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.server.instructions = Some(instructions.into());
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.server.tools.register(tool);
        self
    }

    pub fn resource(mut self, resource: StaticResource) -> Self {
        self.server.resources.register(resource);
        self
    }

    pub fn prompt(mut self, prompt: PromptTemplate) -> Self {
        self.server.prompts.register(prompt);
        self
    }

    pub fn build(self) -> McpServer {
        self.server
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorData> {
    serde_json::from_value(params.unwrap_or_else(|| Value::Object(Map::new())))
        .map_err(|e| ErrorData::invalid_params(format!("Invalid params: {}", e)))
}

fn to_result<T: Serialize>(value: T) -> Result<Value, ErrorData> {
    serde_json::to_value(value).map_err(|e| ErrorData::internal_error(e.to_string()))
}

impl McpServer {
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> McpServerBuilder {
        McpServerBuilder {
            server: McpServer {
                info: Implementation {
                    name: name.into(),
                    version: version.into(),
                },
                instructions: None,
                tools: ToolRegistry::new(),
                resources: ResourceRegistry::default(),
                prompts: PromptRegistry::default(),
            },
        }
    }

    pub fn info(&self) -> &Implementation {
        &self.info
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(Map::new()),
            resources: Some(Map::new()),
            prompts: Some(Map::new()),
            logging: Some(Map::new()),
        }
    }

    /// Answer one request. Failures become JSON-RPC error responses.
    pub async fn handle_request(&self, request: JsonRpcRequest, peer: &Peer) -> JsonRpcMessage {
        let id = request.id.clone();
        debug!(method = %request.method, id = %id, "Handling request");

        match self.dispatch(request, peer).await {
            Ok(result) => JsonRpcMessage::response(id, result),
            Err(error) => {
                debug!(id = %id, code = error.code, "Request failed: {}", error.message);
                JsonRpcMessage::error(Some(id), error)
            }
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest, peer: &Peer) -> Result<Value, ErrorData> {
        match request.method.as_str() {
            "initialize" => {
                let params: InitializeParams = parse_params(request.params)?;
                debug!(
                    client = %params.client_info.name,
                    version = %params.protocol_version,
                    "Client initializing"
                );
                to_result(InitializeResult {
                    protocol_version: negotiate_protocol_version(&params.protocol_version)
                        .to_string(),
                    capabilities: self.capabilities(),
                    server_info: self.info.clone(),
                    instructions: self.instructions.clone(),
                })
            }
            "ping" => Ok(json!({})),
            "tools/list" => {
                let tools: Vec<_> = self.tools.all().into_iter().map(Tool::info).collect();
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                let params: CallToolParams = parse_params(request.params)?;
                let args = params.arguments.unwrap_or_else(|| Value::Object(Map::new()));
                let result = self.tools.execute(&params.name, args, peer).await?;
                to_result(result)
            }
            "resources/list" => Ok(json!({ "resources": self.resources.list() })),
            "resources/read" => {
                let params: ReadResourceParams = parse_params(request.params)?;
                let result = self.resources.read(&params.uri).ok_or_else(|| {
                    ErrorData::invalid_params(format!("Resource {} not found", params.uri))
                })?;
                to_result(result)
            }
            "prompts/list" => Ok(json!({ "prompts": self.prompts.list() })),
            "prompts/get" => {
                let params: GetPromptParams = parse_params(request.params)?;
                to_result(self.prompts.get(&params.name, &params.arguments)?)
            }
            "logging/setLevel" => {
                let params: SetLevelParams = parse_params(request.params)?;
                peer.set_min_level(params.level);
                Ok(json!({}))
            }
            other => Err(ErrorData::method_not_found(other)),
        }
    }

    /// Handle a client notification. Nothing is sent back.
    pub async fn handle_notification(&self, notification: JsonRpcNotification, _peer: &Peer) {
        match notification.method.as_str() {
            "notifications/initialized" => debug!("Client initialized"),
            "notifications/cancelled" => debug!(params = ?notification.params, "Client cancelled a request"),
            other => debug!("Ignoring notification {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::{ToolError, ToolHandler};
    use crate::models::{CallToolResult, LoggingLevel, RequestId, METHOD_NOT_FOUND};
    use crate::transport::{SessionChannel, StreamKey};
    use std::sync::Arc;

    #[derive(Debug)]
    struct FailingHandler;

    #[async_trait::async_trait]
    impl ToolHandler for FailingHandler {
        async fn execute(&self, _args: Value, _peer: &Peer) -> Result<CallToolResult, ToolError> {
            Err(ToolError::Failed("upstream unavailable".to_string()))
        }
    }

    fn server() -> McpServer {
        McpServer::builder("test-server", "1.2.3")
            .tool(Tool {
                name: "fail".to_string(),
                title: None,
                description: "Always fails".to_string(),
                input_schema: json!({"type": "object"}),
                annotations: None,
                handler: Arc::new(FailingHandler),
            })
            .build()
    }

    fn peer() -> (Arc<SessionChannel>, Peer) {
        let channel = Arc::new(SessionChannel::new(8));
        let peer = Peer::new(channel.clone(), StreamKey::Standalone);
        (channel, peer)
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        match JsonRpcMessage::request(1, method, params) {
            JsonRpcMessage::Request(req) => req,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_initialize_echoes_supported_version() {
        let (_, peer) = peer();
        let response = server()
            .handle_request(
                request(
                    "initialize",
                    Some(json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {},
                        "clientInfo": {"name": "c", "version": "1"}
                    })),
                ),
                &peer,
            )
            .await;

        match response {
            JsonRpcMessage::Response(resp) => {
                assert_eq!(resp.id, RequestId::Number(1));
                assert_eq!(resp.result["protocolVersion"], "2024-11-05");
                assert_eq!(resp.result["serverInfo"]["name"], "test-server");
                assert!(resp.result["capabilities"]["logging"].is_object());
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_, peer) = peer();
        match server().handle_request(request("nope/nope", None), &peer).await {
            JsonRpcMessage::Error(err) => assert_eq!(err.error.code, METHOD_NOT_FOUND),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_failure_is_internal_error() {
        let (_, peer) = peer();
        let response = server()
            .handle_request(
                request("tools/call", Some(json!({"name": "fail", "arguments": {}}))),
                &peer,
            )
            .await;
        match response {
            JsonRpcMessage::Error(err) => {
                assert_eq!(err.error.code, crate::models::INTERNAL_ERROR);
                assert_eq!(err.error.message, "upstream unavailable");
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_level() {
        let (channel, peer) = peer();
        let response = server()
            .handle_request(
                request("logging/setLevel", Some(json!({"level": "error"}))),
                &peer,
            )
            .await;
        assert!(matches!(response, JsonRpcMessage::Response(_)));
        assert_eq!(channel.min_level(), LoggingLevel::Error);
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let (_, peer) = peer();
        match server()
            .handle_request(request("resources/read", Some(json!({}))), &peer)
            .await
        {
            JsonRpcMessage::Error(err) => {
                assert_eq!(err.error.code, crate::models::INVALID_PARAMS)
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }
}
