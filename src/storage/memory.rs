//! In-process engine
//!
//! Keeps every collection as an insertion-ordered vector guarded by its own
//! lock. Provisioned specs are enforced on every write: required fields,
//! native types, unique indexes and timestamps. Expired documents of TTL
//! collections are purged before each read.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

use super::definition::CollectionSpec;
use super::document::{compare_by, extract_field_value, lookup, matches, project, Document, ID_FIELD};
use super::engine::{Engine, QueryOptions};
use crate::error::{DbError, DbResult};

/// Fields of the sequence records handled by [`Engine::increment`]
const COUNTER_KEY: &str = "key";
const COUNTER_VALUE: &str = "value";

#[derive(Debug)]
struct MemoryCollection {
    spec: CollectionSpec,
    documents: Vec<Document>,
}

impl MemoryCollection {
    fn new(spec: CollectionSpec) -> Self {
        Self {
            spec,
            documents: Vec::new(),
        }
    }

    fn position_of(&self, id: &Value) -> Option<usize> {
        self.documents
            .iter()
            .position(|doc| doc.get(ID_FIELD) == Some(id))
    }

    /// Matching documents in engine order, or sorted when requested
    fn select(&self, filter: &Document, options: &QueryOptions) -> DbResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, doc) in self.documents.iter().enumerate() {
            if matches(doc, filter)? {
                positions.push(position);
            }
        }

        if let Some(sort) = &options.sort {
            positions.sort_by(|a, b| compare_by(&self.documents[*a], &self.documents[*b], sort));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.filter(|limit| *limit > 0).map(|l| l as usize);
        Ok(positions
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Required fields and native types
    fn check_fields(&self, doc: &Document) -> DbResult<()> {
        for field in &self.spec.fields {
            let value = lookup(doc, &field.name);
            if field.required && value.map(Value::is_null).unwrap_or(true) {
                return Err(DbError::StorageError(format!(
                    "field '{}' is required in '{}'",
                    field.name, self.spec.name
                )));
            }
            if let (Some(native), Some(value)) = (field.native_type(), value) {
                if !native.accepts(value) {
                    return Err(DbError::StorageError(format!(
                        "field '{}' of '{}' expects {}, got {}",
                        field.name, self.spec.name, native, value
                    )));
                }
            }
        }
        Ok(())
    }

    /// Unique indexes, ignoring the document at `except`
    fn check_unique(&self, doc: &Document, except: Option<usize>) -> DbResult<()> {
        for index in self.spec.unique_indexes() {
            let names = index.field_names();
            if index.sparse && names.iter().any(|name| lookup(doc, name).is_none()) {
                continue;
            }

            let values: Vec<Value> = names
                .iter()
                .map(|name| extract_field_value(doc, name))
                .collect();
            if values.iter().all(Value::is_null) {
                continue;
            }

            let duplicate = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != except)
                .any(|(_, other)| {
                    names
                        .iter()
                        .zip(values.iter())
                        .all(|(name, value)| &extract_field_value(other, name) == value)
                });
            if duplicate {
                return Err(DbError::UniqueViolation(format!(
                    "{:?} already exists in index '{}' of '{}'",
                    values,
                    index.display_name(),
                    self.spec.name
                )));
            }
        }
        Ok(())
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.spec.ttl.clone() else {
            return 0;
        };
        let before = self.documents.len();
        self.documents.retain(|doc| {
            let stamped = lookup(doc, &ttl.field)
                .and_then(Value::as_str)
                .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok());
            match stamped {
                // Expiry beyond the representable range never comes
                Some(stamp) => i64::try_from(ttl.expire_after_seconds)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|lifetime| stamp.with_timezone(&Utc).checked_add_signed(lifetime))
                    .map_or(true, |expires| expires > now),
                None => true,
            }
        });
        before - self.documents.len()
    }
}

/// Engine keeping all collections in memory
#[derive(Debug, Default)]
pub struct MemoryEngine {
    collections: DashMap<String, Arc<RwLock<MemoryCollection>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> DbResult<Arc<RwLock<MemoryCollection>>> {
        self.collections
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DbError::CollectionNotFound(name.to_string()))
    }

    /// Collection handle with expired documents already purged
    fn fresh_collection(&self, name: &str) -> DbResult<Arc<RwLock<MemoryCollection>>> {
        let collection = self.collection(name)?;
        if collection.read().spec.ttl.is_some() {
            collection.write().purge_expired(Utc::now());
        }
        Ok(collection)
    }

    /// Names of all provisioned collections
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Spec a collection was provisioned with
    pub fn collection_spec(&self, name: &str) -> Option<CollectionSpec> {
        self.collections.get(name).map(|e| e.value().read().spec.clone())
    }

    /// Whether any collection carries a TTL
    pub fn has_ttl_collections(&self) -> bool {
        self.collections
            .iter()
            .any(|entry| entry.value().read().spec.ttl.is_some())
    }

    /// Delete documents whose TTL elapsed before `now`, returning how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let handles: Vec<Arc<RwLock<MemoryCollection>>> =
            self.collections.iter().map(|e| e.value().clone()).collect();
        handles
            .iter()
            .map(|collection| collection.write().purge_expired(now))
            .sum()
    }
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn new_id() -> Value {
    Value::String(uuid::Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext)).to_string())
}

#[async_trait]
impl Engine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn provision(&self, spec: &CollectionSpec) -> DbResult<()> {
        self.collections
            .entry(spec.name.clone())
            .and_modify(|collection| collection.write().spec = spec.clone())
            .or_insert_with(|| Arc::new(RwLock::new(MemoryCollection::new(spec.clone()))));
        tracing::debug!(
            collection = %spec.name,
            indexes = spec.indexes.len(),
            "Provisioned in-memory collection"
        );
        Ok(())
    }

    async fn count(&self, collection: &str, filter: &Document) -> DbResult<u64> {
        let collection = self.fresh_collection(collection)?;
        let guard = collection.read();
        let mut count = 0;
        for doc in &guard.documents {
            if matches(doc, filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        options: &QueryOptions,
    ) -> DbResult<Option<Document>> {
        let options = QueryOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self
            .find(collection, filter, projection, &options)
            .await?
            .into_iter()
            .next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        options: &QueryOptions,
    ) -> DbResult<Vec<Document>> {
        let collection = self.fresh_collection(collection)?;
        let guard = collection.read();
        let positions = guard.select(filter, options)?;
        Ok(positions
            .into_iter()
            .map(|position| {
                let doc = guard.documents[position].clone();
                match projection {
                    Some(projection) => project(doc, projection),
                    None => doc,
                }
            })
            .collect())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> DbResult<Document> {
        let collection = self.fresh_collection(collection)?;
        let mut guard = collection.write();

        let id = match document.get(ID_FIELD) {
            Some(id) if !id.is_null() => id.clone(),
            _ => new_id(),
        };
        if guard.position_of(&id).is_some() {
            return Err(DbError::UniqueViolation(format!(
                "_id {} already exists in '{}'",
                id, guard.spec.name
            )));
        }
        document.insert(ID_FIELD.to_string(), id);

        if let Some(timestamps) = guard.spec.timestamps.clone() {
            let now = timestamp();
            document.insert(timestamps.created_at, now.clone());
            document.insert(timestamps.updated_at, now);
        }

        guard.check_fields(&document)?;
        guard.check_unique(&document, None)?;
        guard.documents.push(document.clone());
        Ok(document)
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &Value,
        mut document: Document,
    ) -> DbResult<Document> {
        let collection = self.fresh_collection(collection)?;
        let mut guard = collection.write();

        let position = guard.position_of(id).ok_or_else(|| {
            DbError::StorageError(format!("no document with _id {} in '{}'", id, guard.spec.name))
        })?;
        document.insert(ID_FIELD.to_string(), id.clone());

        if let Some(timestamps) = guard.spec.timestamps.clone() {
            let created = guard.documents[position]
                .get(&timestamps.created_at)
                .cloned()
                .unwrap_or_else(timestamp);
            document.insert(timestamps.created_at, created);
            document.insert(timestamps.updated_at, timestamp());
        }

        guard.check_fields(&document)?;
        guard.check_unique(&document, Some(position))?;
        guard.documents[position] = document.clone();
        Ok(document)
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Document,
        options: &QueryOptions,
    ) -> DbResult<Option<Document>> {
        let collection = self.fresh_collection(collection)?;
        let mut guard = collection.write();
        let first = guard.select(filter, options)?.into_iter().next();
        Ok(first.map(|position| guard.documents.remove(position)))
    }

    async fn increment(&self, collection: &str, key: &str) -> DbResult<i64> {
        let collection = self.collection(collection)?;
        let mut guard = collection.write();

        let existing = guard
            .documents
            .iter_mut()
            .find(|doc| doc.get(COUNTER_KEY).and_then(Value::as_str) == Some(key));
        match existing {
            Some(doc) => {
                let next = doc.get(COUNTER_VALUE).and_then(Value::as_i64).unwrap_or(0) + 1;
                doc.insert(COUNTER_VALUE.to_string(), Value::from(next));
                Ok(next)
            }
            None => {
                let mut doc = Document::new();
                doc.insert(ID_FIELD.to_string(), new_id());
                doc.insert(COUNTER_KEY.to_string(), Value::String(key.to_string()));
                doc.insert(COUNTER_VALUE.to_string(), Value::from(1));
                guard.documents.push(doc);
                Ok(1)
            }
        }
    }

    async fn close(&self) -> DbResult<()> {
        Ok(())
    }
}
