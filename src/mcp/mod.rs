//! MCP (Model Context Protocol) implementation.

pub mod demo;
pub mod doc_tools;
mod resources;
pub mod server;
mod tools;

use std::sync::Arc;
use std::time::Duration;

pub use resources::{PromptRegistry, PromptTemplate, ResourceRegistry, StaticResource};
pub use server::{McpServer, McpServerBuilder};
pub use tools::{parse_args, Tool, ToolError, ToolHandler, ToolRegistry};

use crate::config::Config;
use crate::docs::{DocFetcher, FetchError};
use crate::store::{ChromaStore, OpenAiEmbedder, SnippetStore};
use crate::utils::HttpClient;

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "doc-ingestor-server";

/// Build the server with every tool, resource and prompt registered
pub fn build_server(config: &Config) -> Result<McpServer, FetchError> {
    let client = HttpClient::with_settings(
        &config.scraper.user_agent,
        Duration::from_secs(config.scraper.timeout_secs),
        Duration::from_secs(config.scraper.connect_timeout_secs),
    )?;

    let fetcher = Arc::new(DocFetcher::new(client.clone()));
    let store = match OpenAiEmbedder::from_config(client.clone(), &config.embeddings) {
        Ok(embedder) => Some(SnippetStore::new(
            Arc::new(embedder),
            Arc::new(ChromaStore::from_config(client, &config.vector_store)),
            config.vector_store.collection.clone(),
        )),
        Err(e) => {
            tracing::warn!("Snippet storage disabled: {}", e);
            None
        }
    };

    let builder = McpServer::builder(SERVER_NAME, env!("CARGO_PKG_VERSION")).instructions(
        "Scrape library documentation pages and store code snippets in a vector database.",
    );
    let builder = demo::register(builder, config.demo.multi_greet_delay());
    let builder = doc_tools::register(builder, fetcher, store);

    Ok(builder.build())
}
