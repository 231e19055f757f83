//! # Doc Ingestor MCP
//!
//! A Model Context Protocol (MCP) server that scrapes library documentation
//! and stores code snippets in a vector database, reachable over streamable
//! HTTP or stdio.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: JSON-RPC envelope and MCP payload types
//! - [`transport`]: Session registry, per-session transports, HTTP and stdio front ends
//! - [`mcp`]: Method dispatch and the registered tools, resources and prompts
//! - [`docs`]: Documentation page fetching and text extraction
//! - [`store`]: Embedding and vector store clients
//! - [`utils`]: HTTP client
//! - [`config`]: Configuration management

pub mod config;
pub mod docs;
pub mod mcp;
pub mod models;
pub mod store;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use mcp::{build_server, McpServer};
pub use transport::{SessionRegistry, SessionTransport, StdioTransport, StreamableHttpService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
