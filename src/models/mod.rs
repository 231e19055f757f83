//! Core data models for JSON-RPC framing and MCP payloads.

mod jsonrpc;
mod protocol;

pub use jsonrpc::{
    ErrorData, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcVersion, RequestId, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR, SERVER_ERROR,
};
pub use protocol::{
    negotiate_protocol_version, CallToolParams, CallToolResult, Content, GetPromptParams,
    GetPromptResult, Implementation, InitializeParams, InitializeResult, LoggingLevel,
    LoggingMessageParams, Prompt, PromptArgument, PromptMessage, ReadResourceParams,
    ReadResourceResult, Resource, ResourceContents, Role, ServerCapabilities, SetLevelParams,
    ToolAnnotations, ToolInfo, LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
