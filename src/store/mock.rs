//! In-memory embedder and vector store for testing purposes.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{AddRecords, Collection, Embedder, StoreError, VectorStore};

/// Embeds every document as a fixed-size vector derived from its length.
#[derive(Debug)]
pub struct MockEmbedder {
    dimensions: usize,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed_documents` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_documents(&self, documents: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(documents
            .iter()
            .map(|doc| vec![doc.len() as f32; self.dimensions])
            .collect())
    }
}

/// Records collections and added records in memory.
#[derive(Debug, Default)]
pub struct MockVectorStore {
    collections: Mutex<Vec<(String, Map<String, Value>)>>,
    added: Mutex<Vec<(Collection, AddRecords)>>,
    failure: Mutex<Option<String>>,
}

impl MockVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail with `message`
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
    }

    /// Collections requested so far, with their metadata
    pub fn collections(&self) -> Vec<(String, Map<String, Value>)> {
        self.collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every `add` call so far
    pub fn added(&self) -> Vec<(Collection, AddRecords)> {
        self.added.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        match &*self.failure.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(message) => Err(StoreError::Api {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: Map<String, Value>,
    ) -> Result<Collection, StoreError> {
        self.check()?;
        self.collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), metadata));
        Ok(Collection {
            id: format!("mock-{}", name),
            name: name.to_string(),
        })
    }

    async fn add(&self, collection: &Collection, records: AddRecords) -> Result<(), StoreError> {
        self.check()?;
        self.added
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((collection.clone(), records));
        Ok(())
    }
}
