//! Chroma vector database client (HTTP API v2).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AddRecords, Collection, StoreError, VectorStore};
use crate::config::VectorStoreConfig;
use crate::utils::HttpClient;

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    metadata: Map<String, Value>,
    get_or_create: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
    name: String,
}

/// Chroma server reached over HTTP
#[derive(Debug, Clone)]
pub struct ChromaStore {
    client: HttpClient,
    base_url: String,
    tenant: String,
    database: String,
}

impl ChromaStore {
    pub fn new(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
        }
    }

    pub fn from_config(client: HttpClient, config: &VectorStoreConfig) -> Self {
        let mut store = Self::new(client, &config.url);
        store.tenant = config.tenant.clone();
        store.database = config.database.clone();
        store
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: Map<String, Value>,
    ) -> Result<Collection, StoreError> {
        let response = self
            .client
            .client()
            .post(self.collections_url())
            .json(&CreateCollectionRequest {
                name,
                metadata,
                get_or_create: true,
            })
            .send()
            .await?;

        let collection: CollectionResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        tracing::debug!(id = %collection.id, name = %collection.name, "Using Chroma collection");
        Ok(Collection {
            id: collection.id,
            name: collection.name,
        })
    }

    async fn add(&self, collection: &Collection, records: AddRecords) -> Result<(), StoreError> {
        let url = format!("{}/{}/add", self.collections_url(), collection.id);
        let response = self
            .client
            .client()
            .post(url)
            .json(&records)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const COLLECTIONS: &str = "/api/v2/tenants/default_tenant/databases/default_database/collections";

    #[tokio::test]
    async fn test_get_or_create_then_add() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", COLLECTIONS)
            .match_body(Matcher::PartialJson(json!({
                "name": "snippet",
                "metadata": {"hnsw:space": "cosine"},
                "get_or_create": true
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "c-123", "name": "snippet", "metadata": {}}).to_string())
            .create_async()
            .await;
        let add = server
            .mock("POST", format!("{}/c-123/add", COLLECTIONS).as_str())
            .match_body(Matcher::PartialJson(json!({
                "ids": ["id-1"],
                "documents": ["doc"],
                "metadatas": [{"source": "https://a.test"}]
            })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let store = ChromaStore::new(HttpClient::new().unwrap(), format!("{}/", server.url()));
        let mut metadata = Map::new();
        metadata.insert("hnsw:space".to_string(), json!("cosine"));
        let collection = store
            .get_or_create_collection("snippet", metadata)
            .await
            .unwrap();
        assert_eq!(collection.id, "c-123");

        let mut meta = Map::new();
        meta.insert("source".to_string(), json!("https://a.test"));
        store
            .add(
                &collection,
                AddRecords {
                    ids: vec!["id-1".to_string()],
                    embeddings: vec![vec![0.5, 0.5]],
                    documents: vec!["doc".to_string()],
                    metadatas: vec![meta],
                },
            )
            .await
            .unwrap();

        create.assert_async().await;
        add.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", COLLECTIONS)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let store = ChromaStore::new(HttpClient::new().unwrap(), server.url());
        let err = store
            .get_or_create_collection("snippet", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 500, .. }));
    }
}
