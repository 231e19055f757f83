//! Documentation ingestion tools: scraping pages and storing snippets.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::server::McpServerBuilder;
use super::tools::{parse_args, Tool, ToolError, ToolHandler};
use crate::docs::DocFetcher;
use crate::models::CallToolResult;
use crate::store::{Snippet, SnippetStore};
use crate::transport::Peer;

fn parse_url(raw: &str) -> Result<Url, ToolError> {
    Url::parse(raw).map_err(|e| ToolError::InvalidArguments(format!("invalid url '{}': {}", raw, e)))
}

fn pretty(value: &impl serde::Serialize) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value).map_err(|e| ToolError::Failed(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct UrlArgs {
    url: String,
}

#[derive(Debug, Deserialize)]
struct UrlsArgs {
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SnippetArgs {
    snippets: Vec<Snippet>,
}

/// `get-all-urls-from-docs`
#[derive(Debug)]
pub struct GetAllUrlsHandler {
    pub fetcher: Arc<DocFetcher>,
}

#[async_trait::async_trait]
impl ToolHandler for GetAllUrlsHandler {
    async fn execute(&self, args: Value, _peer: &Peer) -> Result<CallToolResult, ToolError> {
        let args: UrlArgs = parse_args(args)?;
        let url = parse_url(&args.url)?;
        let urls = self.fetcher.get_all_doc_urls(&url).await;
        tracing::info!("Found {} documentation links on {}", urls.len(), url);
        Ok(CallToolResult::text(pretty(&urls)?))
    }
}

/// `get-text-content-from-url`
#[derive(Debug)]
pub struct GetTextContentHandler {
    pub fetcher: Arc<DocFetcher>,
}

#[async_trait::async_trait]
impl ToolHandler for GetTextContentHandler {
    async fn execute(&self, args: Value, _peer: &Peer) -> Result<CallToolResult, ToolError> {
        let args: UrlArgs = parse_args(args)?;
        let url = parse_url(&args.url)?;
        let text = self
            .fetcher
            .extract_content(&url)
            .await
            .map(|doc| doc.page_content)
            .unwrap_or_default();
        Ok(CallToolResult::text(text))
    }
}

/// `get-multiple-text-content-from-urls`
#[derive(Debug)]
pub struct GetMultipleTextContentHandler {
    pub fetcher: Arc<DocFetcher>,
}

#[async_trait::async_trait]
impl ToolHandler for GetMultipleTextContentHandler {
    async fn execute(&self, args: Value, _peer: &Peer) -> Result<CallToolResult, ToolError> {
        let args: UrlsArgs = parse_args(args)?;
        let urls = args
            .urls
            .iter()
            .map(|raw| parse_url(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let contents: Vec<Option<String>> = self
            .fetcher
            .extract_many(&urls)
            .await
            .into_iter()
            .map(|doc| doc.map(|d| d.page_content))
            .collect();
        Ok(CallToolResult::text(pretty(&contents)?))
    }
}

/// `store-snippet-in-chromadb`
#[derive(Debug)]
pub struct StoreSnippetHandler {
    /// `None` when the embedding service is not configured
    pub store: Option<SnippetStore>,
}

#[async_trait::async_trait]
impl ToolHandler for StoreSnippetHandler {
    async fn execute(&self, args: Value, _peer: &Peer) -> Result<CallToolResult, ToolError> {
        let args: SnippetArgs = parse_args(args)?;
        let store = self.store.as_ref().ok_or_else(|| {
            ToolError::Failed(
                "Snippet storage is unavailable: no embeddings API key configured".to_string(),
            )
        })?;

        let saved = store
            .save(&args.snippets)
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to store snippets: {}", e)))?;
        Ok(CallToolResult::text(format!("{} snippets saved", saved)))
    }
}

fn url_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "url": {"type": "string", "format": "uri"}
        },
        "required": ["url"]
    })
}

/// Register the documentation ingestion tools
pub fn register(
    builder: McpServerBuilder,
    fetcher: Arc<DocFetcher>,
    store: Option<SnippetStore>,
) -> McpServerBuilder {
    builder
        .tool(Tool {
            name: "get-all-urls-from-docs".to_string(),
            title: Some("Get All URLS from docs".to_string()),
            description: "Scrape content from a library documentation URL and get all documentation links (URLS)".to_string(),
            input_schema: url_schema(),
            annotations: None,
            handler: Arc::new(GetAllUrlsHandler {
                fetcher: fetcher.clone(),
            }),
        })
        .tool(Tool {
            name: "get-text-content-from-url".to_string(),
            title: Some("Get text content from url".to_string()),
            description: "Scrape text content from a library documentation URL".to_string(),
            input_schema: url_schema(),
            annotations: None,
            handler: Arc::new(GetTextContentHandler {
                fetcher: fetcher.clone(),
            }),
        })
        .tool(Tool {
            name: "get-multiple-text-content-from-urls".to_string(),
            title: Some("Get multiples text content from urls".to_string()),
            description: "Scrape text content from a library documentation URLS".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "urls": {
                        "type": "array",
                        "items": {"type": "string", "format": "uri"}
                    }
                },
                "required": ["urls"]
            }),
            annotations: None,
            handler: Arc::new(GetMultipleTextContentHandler { fetcher }),
        })
        .tool(Tool {
            name: "store-snippet-in-chromadb".to_string(),
            title: Some("Store short snippets in vector databases (chromadb)".to_string()),
            description: "Store a small snippets in vector databases (chromadb)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "snippets": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": {
                                    "type": "string",
                                    "description": "Short, clear title describing what the snippet demonstrates"
                                },
                                "description": {
                                    "type": "string",
                                    "description": "Brief explanation of what the snippet does and why it matters (mention functions, hooks, behaviors, etc.)"
                                },
                                "source": {"type": "string", "description": "source URL"},
                                "language": {
                                    "type": "string",
                                    "description": "language name (e.g., 'Python', 'Javascript', 'Css', 'HTML', ...)"
                                },
                                "code": {"type": "string", "description": "A short code snippet as a string"}
                            },
                            "required": ["title", "description", "source", "language", "code"]
                        }
                    }
                },
                "required": ["snippets"]
            }),
            annotations: None,
            handler: Arc::new(StoreSnippetHandler { store }),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockEmbedder, MockVectorStore};
    use crate::transport::{SessionChannel, StreamKey};
    use crate::utils::HttpClient;

    fn peer() -> Peer {
        Peer::new(Arc::new(SessionChannel::new(4)), StreamKey::Standalone)
    }

    fn fetcher() -> Arc<DocFetcher> {
        Arc::new(DocFetcher::new(HttpClient::new().unwrap()))
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let handler = GetAllUrlsHandler { fetcher: fetcher() };
        let err = handler
            .execute(json!({"url": "not a url"}), &peer())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_text_content_empty_on_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/gone").with_status(404).create_async().await;

        let handler = GetTextContentHandler { fetcher: fetcher() };
        let result = handler
            .execute(json!({"url": format!("{}/gone", server.url())}), &peer())
            .await
            .unwrap();
        assert_eq!(result, CallToolResult::text(""));
    }

    #[tokio::test]
    async fn test_multiple_text_content() {
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("GET", "/a")
            .with_body("<body>alpha</body>")
            .create_async()
            .await;
        let _b = server.mock("GET", "/b").with_status(500).create_async().await;

        let handler = GetMultipleTextContentHandler { fetcher: fetcher() };
        let result = handler
            .execute(
                json!({"urls": [format!("{}/a", server.url()), format!("{}/b", server.url())]}),
                &peer(),
            )
            .await
            .unwrap();
        let text = result.content[0].as_text().unwrap();
        let parsed: Vec<Option<String>> = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, vec![Some("alpha".to_string()), None]);
    }

    #[tokio::test]
    async fn test_store_snippets() {
        let store = Arc::new(MockVectorStore::new());
        let handler = StoreSnippetHandler {
            store: Some(SnippetStore::new(Arc::new(MockEmbedder::new(3)), store.clone(), "snippet")),
        };
        let result = handler
            .execute(
                json!({"snippets": [{
                    "title": "t", "description": "d", "source": "https://a.test",
                    "language": "Rust", "code": "fn main() {}"
                }]}),
                &peer(),
            )
            .await
            .unwrap();
        assert_eq!(result, CallToolResult::text("1 snippets saved"));
        assert_eq!(store.added().len(), 1);
    }

    #[tokio::test]
    async fn test_store_unconfigured_fails() {
        let handler = StoreSnippetHandler { store: None };
        let err = handler
            .execute(json!({"snippets": []}), &peer())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }
}
