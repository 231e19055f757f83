//! Snippet persistence through an embedding service and a vector store.
//!
//! Both collaborators sit behind traits so the tool layer never knows which
//! services back them:
//!
//! - [`Embedder`]: turns documents into vectors ([`OpenAiEmbedder`])
//! - [`VectorStore`]: stores documents with their vectors ([`ChromaStore`])

mod chroma;
pub mod mock;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub use chroma::ChromaStore;
pub use mock::{MockEmbedder, MockVectorStore};
pub use openai::OpenAiEmbedder;

/// Errors from the embedding service or the vector store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success response from the remote API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The remote API answered with something unexpected
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Missing or invalid client settings
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A code snippet with enough context to be useful on retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    /// Short, clear title describing what the snippet demonstrates
    pub title: String,
    /// What the snippet does and why it matters
    pub description: String,
    /// Source URL
    pub source: String,
    /// Language name (e.g. "Python", "Javascript")
    pub language: String,
    pub code: String,
}

/// The document text stored and embedded for a snippet
pub fn format_snippet(snippet: &Snippet) -> String {
    format!(
        "TITLE: {}\nDESCRIPTION: {}\nSOURCE: {}\nLANGUAGE: {}\nCODE:\n```\n{}\n```",
        snippet.title, snippet.description, snippet.source, snippet.language, snippet.code
    )
}

/// Produces embedding vectors for documents
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// One vector per document, in input order
    async fn embed_documents(&self, documents: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;
}

/// Handle to a vector store collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    pub name: String,
}

/// Parallel arrays describing records to add
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AddRecords {
    pub ids: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Map<String, Value>>,
}

/// A vector database
#[async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug {
    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: Map<String, Value>,
    ) -> Result<Collection, StoreError>;

    async fn add(&self, collection: &Collection, records: AddRecords) -> Result<(), StoreError>;
}

/// Embeds snippets and adds them to one collection
#[derive(Debug, Clone)]
pub struct SnippetStore {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl SnippetStore {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
        }
    }

    /// Store the snippets and return how many were saved
    pub async fn save(&self, snippets: &[Snippet]) -> Result<usize, StoreError> {
        if snippets.is_empty() {
            return Ok(0);
        }

        let mut metadata = Map::new();
        metadata.insert("hnsw:space".to_string(), Value::from("cosine"));
        let collection = self
            .store
            .get_or_create_collection(&self.collection, metadata)
            .await?;

        let documents: Vec<String> = snippets.iter().map(format_snippet).collect();
        let embeddings = self.embedder.embed_documents(&documents).await?;
        if embeddings.len() != documents.len() {
            return Err(StoreError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }

        let saved = embeddings.len();
        let records = AddRecords {
            ids: snippets.iter().map(|_| Uuid::new_v4().to_string()).collect(),
            embeddings,
            documents,
            metadatas: snippets
                .iter()
                .map(|s| {
                    let mut meta = Map::new();
                    meta.insert("source".to_string(), Value::from(s.source.clone()));
                    meta
                })
                .collect(),
        };
        self.store.add(&collection, records).await?;

        tracing::info!(collection = %collection.name, saved, "Stored snippets");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(source: &str) -> Snippet {
        Snippet {
            title: "Parse a schema".to_string(),
            description: "Uses z.object".to_string(),
            source: source.to_string(),
            language: "Typescript".to_string(),
            code: "z.object({})".to_string(),
        }
    }

    #[test]
    fn test_format_snippet() {
        let text = format_snippet(&snippet("https://zod.dev"));
        assert!(text.starts_with("TITLE: Parse a schema\nDESCRIPTION: Uses z.object\n"));
        assert!(text.contains("SOURCE: https://zod.dev\nLANGUAGE: Typescript\nCODE:\n```\nz.object({})\n```"));
    }

    #[tokio::test]
    async fn test_save_snippets() {
        let embedder = Arc::new(MockEmbedder::new(4));
        let store = Arc::new(MockVectorStore::new());
        let snippets = SnippetStore::new(embedder.clone(), store.clone(), "snippet");

        let saved = snippets
            .save(&[snippet("https://a.test"), snippet("https://b.test")])
            .await
            .unwrap();
        assert_eq!(saved, 2);

        let collections = store.collections();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].0, "snippet");
        assert_eq!(collections[0].1["hnsw:space"], "cosine");

        let added = store.added();
        assert_eq!(added.len(), 1);
        let records = &added[0].1;
        assert_eq!(records.ids.len(), 2);
        assert_ne!(records.ids[0], records.ids[1]);
        assert_eq!(records.embeddings[0].len(), 4);
        assert_eq!(records.metadatas[1]["source"], "https://b.test");
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn test_save_nothing() {
        let embedder = Arc::new(MockEmbedder::new(4));
        let store = Arc::new(MockVectorStore::new());
        let snippets = SnippetStore::new(embedder.clone(), store.clone(), "snippet");

        assert_eq!(snippets.save(&[]).await.unwrap(), 0);
        assert_eq!(embedder.calls(), 0);
        assert!(store.collections().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = Arc::new(MockVectorStore::new());
        store.fail_with("collection unavailable");
        let snippets = SnippetStore::new(Arc::new(MockEmbedder::new(2)), store, "snippet");

        let err = snippets.save(&[snippet("https://a.test")]).await.unwrap_err();
        assert!(err.to_string().contains("collection unavailable"));
    }
}
