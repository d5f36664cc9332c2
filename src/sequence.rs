//! Atomic counters stored as `{key, value}` records

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::converter::NativeType;
use crate::error::DbResult;
use crate::storage::{CollectionSpec, Engine, FieldSpec, IndexSpec};

pub const DEFAULT_SEQUENCE_COLLECTION: &str = "sequence";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceOptions {
    /// Counter collection, `sequence` when unset
    pub name: Option<String>,
}

impl SequenceOptions {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
        }
    }
}

/// A monotonic counter identified by `key`
#[derive(Debug)]
pub struct Sequence {
    engine: Arc<dyn Engine>,
    key: String,
    collection: String,
    provisioned: OnceCell<()>,
}

impl Sequence {
    pub fn new(engine: Arc<dyn Engine>, key: &str, options: SequenceOptions) -> Self {
        Self {
            engine,
            key: key.to_string(),
            collection: options
                .name
                .unwrap_or_else(|| DEFAULT_SEQUENCE_COLLECTION.to_string()),
            provisioned: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name of the counter collection
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Allocate the next value; the first call returns 1
    pub async fn get(&self) -> DbResult<i64> {
        self.provisioned
            .get_or_try_init(|| async {
                let spec = CollectionSpec::new(&self.collection)
                    .with_field(FieldSpec::new("key", NativeType::String).required())
                    .with_field(FieldSpec::new("value", NativeType::Number))
                    .with_index(IndexSpec::ascending(&["key"]).unique());
                self.engine.provision(&spec).await
            })
            .await?;

        let value = self.engine.increment(&self.collection, &self.key).await?;
        debug!(sequence = %self.key, value, "Allocated sequence value");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryEngine;

    #[tokio::test]
    async fn test_counts_from_one() {
        let engine: Arc<dyn Engine> = Arc::new(MemoryEngine::new());
        let orders = Sequence::new(engine.clone(), "orders", SequenceOptions::default());
        let invoices = Sequence::new(engine, "invoices", SequenceOptions::named("counters"));

        assert_eq!(orders.get().await.unwrap(), 1);
        assert_eq!(orders.get().await.unwrap(), 2);
        assert_eq!(invoices.get().await.unwrap(), 1);
        assert_eq!(invoices.collection(), "counters");
    }
}
