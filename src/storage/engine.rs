use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::definition::CollectionSpec;
use super::document::Document;
use crate::error::DbResult;

/// Selection options shared by reads and removals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// `{field: 1|-1}` ordering
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl QueryOptions {
    pub fn sorted(sort: Document) -> Self {
        Self {
            sort: Some(sort),
            ..Default::default()
        }
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A storage backend. Every call is one round trip; nothing here retries.
#[async_trait]
pub trait Engine: Send + Sync + std::fmt::Debug {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Create the collection (if needed) and its indexes
    async fn provision(&self, spec: &CollectionSpec) -> DbResult<()>;

    async fn count(&self, collection: &str, filter: &Document) -> DbResult<u64>;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        options: &QueryOptions,
    ) -> DbResult<Option<Document>>;

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        options: &QueryOptions,
    ) -> DbResult<Vec<Document>>;

    /// Insert a new document, returning it with `_id` and timestamps assigned
    async fn insert_one(&self, collection: &str, document: Document) -> DbResult<Document>;

    /// Replace the document with the given `_id`, returning the stored version
    async fn replace_one(&self, collection: &str, id: &Value, document: Document)
        -> DbResult<Document>;

    /// Remove the first document matching `filter` and return it
    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Document,
        options: &QueryOptions,
    ) -> DbResult<Option<Document>>;

    /// Atomically increment the `value` of the `{key, value}` record, creating it at 1
    async fn increment(&self, collection: &str, key: &str) -> DbResult<i64>;

    async fn close(&self) -> DbResult<()>;
}
