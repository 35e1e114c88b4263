//! In-memory secret store.

use dashmap::DashMap;
use serde_json::Value;

use super::SecretStore;
use crate::Result;

/// `DashMap`-backed store that counts reads per path.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    documents: DashMap<String, Value>,
    reads: DashMap<String, usize>,
}

impl InMemorySecretStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `document` at `path`, replacing any previous one.
    pub fn insert(&self, path: impl Into<String>, document: Value) {
        self.documents.insert(path.into(), document);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(self, path: impl Into<String>, document: Value) -> Self {
        self.insert(path, document);
        self
    }

    /// Number of reads issued for `path` (including misses).
    #[must_use]
    pub fn reads(&self, path: &str) -> usize {
        self.reads.get(path).map_or(0, |count| *count)
    }

    /// Total reads across all paths.
    #[must_use]
    pub fn total_reads(&self) -> usize {
        self.reads.iter().map(|entry| *entry.value()).sum()
    }
}

#[async_trait::async_trait]
impl SecretStore for InMemorySecretStore {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        *self.reads.entry(path.to_string()).or_insert(0) += 1;
        Ok(self.documents.get(path).map(|doc| doc.value().clone()))
    }
}
