//! Common test utilities
//!
//! Provides shared helper functions for:
//! - Building documents from `json!` literals
//! - Creating synced in-memory adapters
//! - Counting engine calls

#![allow(dead_code)]

use async_trait::async_trait;
use docshape::storage::{CollectionSpec, Document, Engine, MemoryEngine, QueryOptions};
use docshape::{Adapter, AdapterConfig, DbResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn doc(value: Value) -> Document {
    value.as_object().expect("document literal").clone()
}

pub fn user_schema() -> Value {
    json!({
        "key": "id",
        "properties": {
            "id": {"type": "integer"},
            "name": {"type": "string"},
            "email": {"type": "string"},
            "age": {"type": "number"},
            "tags": {"type": "array"}
        },
        "required": ["name"],
        "indexes": [{"fields": ["email"], "sparse": true}]
    })
}

pub async fn synced_adapter(schemas: &[(&str, Value)]) -> Adapter {
    let mut adapter = Adapter::new(AdapterConfig::memory());
    for (name, schema) in schemas {
        adapter.define(name, schema.clone());
    }
    adapter.sync().await.expect("sync");
    adapter
}

/// Engine wrapper counting the calls that reach the wrapped engine
#[derive(Debug, Default)]
pub struct CountingEngine {
    pub inner: MemoryEngine,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl CountingEngine {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for CountingEngine {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn provision(&self, spec: &CollectionSpec) -> DbResult<()> {
        self.inner.provision(spec).await
    }

    async fn count(&self, collection: &str, filter: &Document) -> DbResult<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.count(collection, filter).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        options: &QueryOptions,
    ) -> DbResult<Option<Document>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_one(collection, filter, projection, options).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        options: &QueryOptions,
    ) -> DbResult<Vec<Document>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find(collection, filter, projection, options).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DbResult<Document> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_one(collection, document).await
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &Value,
        document: Document,
    ) -> DbResult<Document> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.replace_one(collection, id, document).await
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Document,
        options: &QueryOptions,
    ) -> DbResult<Option<Document>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.find_one_and_delete(collection, filter, options).await
    }

    async fn increment(&self, collection: &str, key: &str) -> DbResult<i64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.increment(collection, key).await
    }

    async fn close(&self) -> DbResult<()> {
        self.inner.close().await
    }
}

pub async fn counting_adapter(schemas: &[(&str, Value)]) -> (Adapter, Arc<CountingEngine>) {
    let engine = Arc::new(CountingEngine::default());
    let mut adapter = Adapter::with_engine(AdapterConfig::memory(), engine.clone());
    for (name, schema) in schemas {
        adapter.define(name, schema.clone());
    }
    adapter.sync().await.expect("sync");
    (adapter, engine)
}
