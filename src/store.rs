//! Vector similarity store collaborator used by the memory advisor.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A stored conversational turn plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, Value>,
}

impl Document {
    pub fn new<S: Into<String>>(text: S, metadata: HashMap<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
        }
    }
}

/// A similarity query. The filter is an equality constraint on metadata,
/// never a ranking factor: a document matches only if every filter entry
/// equals the corresponding metadata entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub filter: HashMap<String, Value>,
}

impl SearchRequest {
    pub fn query<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            top_k: 4,
            filter: HashMap::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_filter<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.filter.insert(key.into(), value);
        self
    }
}

/// Store collaborator: ordered similarity search plus append-only writes.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similarity_search(&self, request: &SearchRequest) -> Result<Vec<Document>>;

    async fn write(&self, documents: Vec<Document>) -> Result<()>;
}

/// A naive in-process store scoring by token overlap with the query. Useful
/// for tests and as a worked example of the collaborator contract.
#[derive(Default)]
pub struct InMemoryVectorStore {
    documents: Mutex<Vec<Document>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().unwrap().clone()
    }

    fn score(query: &str, text: &str) -> usize {
        let needles: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        text.split_whitespace()
            .map(|w| w.to_lowercase())
            .filter(|w| needles.contains(w))
            .count()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        let documents = self.documents.lock().unwrap();
        let mut matches: Vec<(usize, Document)> = documents
            .iter()
            .filter(|doc| {
                request
                    .filter
                    .iter()
                    .all(|(key, value)| doc.metadata.get(key) == Some(value))
            })
            .map(|doc| (Self::score(&request.query, &doc.text), doc.clone()))
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matches
            .into_iter()
            .take(request.top_k)
            .map(|(_, doc)| doc)
            .collect())
    }

    async fn write(&self, mut documents: Vec<Document>) -> Result<()> {
        self.documents.lock().unwrap().append(&mut documents);
        Ok(())
    }
}
