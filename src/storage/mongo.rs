//! MongoDB engine
//!
//! Documents cross the boundary as relaxed extended JSON, so ObjectIds and
//! dates come back as `{"$oid": ...}` / `{"$date": ...}` values and are
//! converted back to BSON when used in filters.

use async_trait::async_trait;
use bson::{doc, Bson, DateTime};
use futures::TryStreamExt;
use mongodb::options::{
    FindOneAndDeleteOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, Collection, Database, IndexModel};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use super::definition::{CollectionSpec, IndexSpec, Timestamps};
use super::document::{Document, ID_FIELD};
use super::engine::{Engine, QueryOptions};
use crate::config::AdapterConfig;
use crate::error::{DbError, DbResult};

/// Engine backed by the official MongoDB driver
#[derive(Debug, Clone)]
pub struct MongoEngine {
    client: Client,
    database: Database,
    timestamps: dashmap::DashMap<String, Timestamps>,
}

impl MongoEngine {
    /// Connect and ping the configured database
    pub async fn connect(config: &AdapterConfig) -> DbResult<Self> {
        let uri = config.connection_uri()?;
        info!("Connecting to MongoDB at {}:{}", config.host, config.port);

        let client = Client::with_uri_str(&uri).await?;
        let database = client.database(config.database_name());
        database.run_command(doc! { "ping": 1 }).await?;

        info!("Connected to MongoDB database '{}'", database.name());
        Ok(Self {
            client,
            database,
            timestamps: dashmap::DashMap::new(),
        })
    }

    fn collection(&self, name: &str) -> Collection<bson::Document> {
        self.database.collection::<bson::Document>(name)
    }

    /// Stamp timestamp fields when the collection maintains them
    fn stamp(&self, collection: &str, document: &mut bson::Document, created: Option<Bson>) {
        if let Some(timestamps) = self.timestamps.get(collection) {
            let now = Bson::DateTime(DateTime::now());
            document.insert(
                timestamps.created_at.clone(),
                created.unwrap_or_else(|| now.clone()),
            );
            document.insert(timestamps.updated_at.clone(), now);
        }
    }
}

fn to_bson(document: &Document) -> DbResult<bson::Document> {
    match Bson::try_from(Value::Object(document.clone())) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(DbError::StorageError(format!(
            "expected a document, got {}",
            other
        ))),
        Err(e) => Err(DbError::StorageError(format!("Invalid document: {}", e))),
    }
}

fn to_bson_value(value: &Value) -> DbResult<Bson> {
    Bson::try_from(value.clone())
        .map_err(|e| DbError::StorageError(format!("Invalid value: {}", e)))
}

fn from_bson(document: bson::Document) -> Document {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn index_model(index: &IndexSpec) -> DbResult<IndexModel> {
    let mut keys = bson::Document::new();
    for (field, weight) in &index.fields {
        keys.insert(field.clone(), to_bson_value(weight)?);
    }

    let options = IndexOptions::builder()
        .unique(index.unique.then_some(true))
        .sparse(index.sparse.then_some(true))
        .name(Some(index.display_name()))
        .expire_after(index.expire_after_seconds.map(Duration::from_secs))
        .build();

    Ok(IndexModel::builder().keys(keys).options(options).build())
}

#[async_trait]
impl Engine for MongoEngine {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn provision(&self, spec: &CollectionSpec) -> DbResult<()> {
        match &spec.timestamps {
            Some(timestamps) => {
                self.timestamps.insert(spec.name.clone(), timestamps.clone());
            }
            None => {
                self.timestamps.remove(&spec.name);
            }
        }

        if spec.indexes.is_empty() {
            return Ok(());
        }
        let models = spec
            .indexes
            .iter()
            .map(index_model)
            .collect::<DbResult<Vec<_>>>()?;
        self.collection(&spec.name).create_indexes(models).await?;

        info!(
            "Applied {} index(es) to collection '{}'",
            spec.indexes.len(),
            spec.name
        );
        Ok(())
    }

    async fn count(&self, collection: &str, filter: &Document) -> DbResult<u64> {
        Ok(self
            .collection(collection)
            .count_documents(to_bson(filter)?)
            .await?)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        options: &QueryOptions,
    ) -> DbResult<Option<Document>> {
        let projection = projection.map(to_bson).transpose()?;
        let sort = options.sort.as_ref().map(to_bson).transpose()?;
        let find_options = FindOneOptions::builder()
            .projection(projection)
            .sort(sort)
            .skip(options.skip)
            .build();
        let found = self
            .collection(collection)
            .find_one(to_bson(filter)?)
            .with_options(find_options)
            .await?;
        Ok(found.map(from_bson))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        options: &QueryOptions,
    ) -> DbResult<Vec<Document>> {
        let projection = projection.map(to_bson).transpose()?;
        let sort = options.sort.as_ref().map(to_bson).transpose()?;
        let find_options = FindOptions::builder()
            .projection(projection)
            .sort(sort)
            .skip(options.skip)
            .limit(options.limit.map(|limit| limit as i64))
            .build();
        let cursor = self
            .collection(collection)
            .find(to_bson(filter)?)
            .with_options(find_options)
            .await?;
        let documents: Vec<bson::Document> = cursor.try_collect().await?;
        Ok(documents.into_iter().map(from_bson).collect())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DbResult<Document> {
        let mut document = to_bson(&document)?;
        self.stamp(collection, &mut document, None);

        let result = self.collection(collection).insert_one(&document).await?;
        document.insert(ID_FIELD, result.inserted_id);
        Ok(from_bson(document))
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &Value,
        document: Document,
    ) -> DbResult<Document> {
        let id = to_bson_value(id)?;
        let mut document = to_bson(&document)?;
        document.insert(ID_FIELD, id.clone());

        let created = match self.timestamps.get(collection) {
            Some(timestamps) => document.get(&timestamps.created_at).cloned(),
            None => None,
        };
        self.stamp(collection, &mut document, created);

        let result = self
            .collection(collection)
            .replace_one(doc! { ID_FIELD: id.clone() }, &document)
            .await?;
        if result.matched_count == 0 {
            return Err(DbError::StorageError(format!(
                "no document with _id {} in '{}'",
                id, collection
            )));
        }
        Ok(from_bson(document))
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Document,
        options: &QueryOptions,
    ) -> DbResult<Option<Document>> {
        let sort = options.sort.as_ref().map(to_bson).transpose()?;
        let delete_options = FindOneAndDeleteOptions::builder().sort(sort).build();
        let removed = self
            .collection(collection)
            .find_one_and_delete(to_bson(filter)?)
            .with_options(delete_options)
            .await?;
        Ok(removed.map(from_bson))
    }

    async fn increment(&self, collection: &str, key: &str) -> DbResult<i64> {
        let updated = self
            .collection(collection)
            .find_one_and_update(doc! { "key": key }, doc! { "$inc": { "value": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| DbError::StorageError("counter upsert returned nothing".to_string()))?;

        match updated.get("value") {
            Some(Bson::Int64(value)) => Ok(*value),
            Some(Bson::Int32(value)) => Ok(i64::from(*value)),
            Some(Bson::Double(value)) => Ok(*value as i64),
            other => Err(DbError::StorageError(format!(
                "counter '{}' holds a non-numeric value {:?}",
                key, other
            ))),
        }
    }

    async fn close(&self) -> DbResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
