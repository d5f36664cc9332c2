//! Validated CRUD facade over one provisioned collection

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::storage::{Document, Engine, QueryOptions, SchemaValidator, ID_FIELD};

/// Options for [`Table::set`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOptions {
    /// Validate the record before writing it
    pub validate: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

impl SetOptions {
    pub fn unchecked() -> Self {
        Self { validate: false }
    }
}

/// One table built by [`crate::Adapter::sync`]
#[derive(Debug)]
pub struct Table {
    name: String,
    engine: Arc<dyn Engine>,
    validator: SchemaValidator,
    key: Vec<String>,
    fields: Vec<String>,
}

impl Table {
    pub fn new(
        name: &str,
        engine: Arc<dyn Engine>,
        validator: SchemaValidator,
        key: Vec<String>,
        fields: Vec<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            engine,
            validator,
            key,
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flattened key fields, empty when the schema declares no key
    pub fn key(&self) -> &[String] {
        &self.key
    }

    /// Field names declared in `properties`
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    /// The validation definition documents are checked against
    pub fn definition(&self) -> &Value {
        self.validator.definition()
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Check a document, returning it unchanged when it is valid
    pub fn validate(&self, document: Document) -> DbResult<Document> {
        self.validator.validate(&Value::Object(document.clone()))?;
        Ok(document)
    }

    pub async fn count(&self, conditions: Document) -> DbResult<u64> {
        self.engine.count(&self.name, &conditions).await
    }

    /// First document matching `conditions`; empty conditions never match
    pub async fn get(
        &self,
        conditions: Document,
        projection: Option<Document>,
        options: QueryOptions,
    ) -> DbResult<Option<Document>> {
        if conditions.is_empty() {
            debug!(table = %self.name, "get without conditions, skipping lookup");
            return Ok(None);
        }
        self.engine
            .find_one(&self.name, &conditions, projection.as_ref(), &options)
            .await
    }

    /// All documents matching `conditions`
    pub async fn find(
        &self,
        conditions: Document,
        projection: Option<Document>,
        options: QueryOptions,
    ) -> DbResult<Vec<Document>> {
        self.engine
            .find(&self.name, &conditions, projection.as_ref(), &options)
            .await
    }

    /// Upsert by key.
    ///
    /// The stored record matching the key fields present in `document` gets
    /// the declared fields of `document` merged onto it; undeclared fields are
    /// ignored. Without a match the full `document` is inserted.
    pub async fn set(&self, document: Document, options: SetOptions) -> DbResult<Document> {
        let conditions: Document = self
            .key
            .iter()
            .filter_map(|field| {
                document
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect();

        match self.get(conditions, None, QueryOptions::default()).await? {
            Some(mut existing) => {
                for field in &self.fields {
                    if let Some(value) = document.get(field) {
                        existing.insert(field.clone(), value.clone());
                    }
                }
                let existing = if options.validate {
                    self.validate(existing)?
                } else {
                    existing
                };

                let id = existing.get(ID_FIELD).cloned().ok_or_else(|| {
                    DbError::StorageError(format!("stored record in '{}' has no _id", self.name))
                })?;
                debug!(table = %self.name, id = %id, "Updating record");
                self.engine.replace_one(&self.name, &id, existing).await
            }
            None => {
                let document = if options.validate {
                    self.validate(document)?
                } else {
                    document
                };
                debug!(table = %self.name, "Inserting record");
                self.engine.insert_one(&self.name, document).await
            }
        }
    }

    /// Remove the first document matching `conditions`; empty conditions remove nothing
    pub async fn remove(
        &self,
        conditions: Document,
        options: QueryOptions,
    ) -> DbResult<Option<Document>> {
        if conditions.is_empty() {
            debug!(table = %self.name, "remove without conditions, nothing removed");
            return Ok(None);
        }
        self.engine
            .find_one_and_delete(&self.name, &conditions, &options)
            .await
    }
}
