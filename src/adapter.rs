//! Schema registry and connection lifecycle
//!
//! Schemas are registered with [`Adapter::define`], then [`Adapter::sync`]
//! converts each one into a storage definition and a validation definition,
//! provisions the collection and builds its [`Table`]. Tables that already
//! exist are left alone on later syncs.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{AdapterConfig, EngineKind};
use crate::converter::{flatten_keys, properties_of, Converters};
use crate::error::{DbError, DbResult};
use crate::sequence::{Sequence, SequenceOptions, DEFAULT_SEQUENCE_COLLECTION};
use crate::storage::{Engine, MemoryEngine, SchemaValidator, StorageDefinition};
use crate::table::Table;
use crate::ttl::TtlWorker;

pub struct Adapter {
    config: AdapterConfig,
    converters: Converters,
    schemas: Map<String, Value>,
    engine: RwLock<Option<Arc<dyn Engine>>>,
    ttl_task: Mutex<Option<(JoinHandle<()>, Arc<MemoryEngine>)>>,
    tables: DashMap<String, Arc<Table>>,
    sequences: DashMap<(String, String), Arc<Sequence>>,
}

impl Adapter {
    pub fn new(config: AdapterConfig) -> Self {
        let converters = Converters::new(&config.converter);
        Self {
            config,
            converters,
            schemas: Map::new(),
            engine: RwLock::new(None),
            ttl_task: Mutex::new(None),
            tables: DashMap::new(),
            sequences: DashMap::new(),
        }
    }

    /// Adapter already connected to `engine`
    pub fn with_engine(config: AdapterConfig, engine: Arc<dyn Engine>) -> Self {
        let adapter = Self::new(config);
        *adapter.engine.write() = Some(engine);
        adapter
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn converters(&self) -> &Converters {
        &self.converters
    }

    /// Register a generic schema under `name`, replacing any earlier one
    pub fn define(&mut self, name: &str, schema: Value) -> &mut Self {
        debug!(schema = %name, "Defined schema");
        self.schemas.insert(name.to_string(), schema);
        self
    }

    /// Registered schemas in definition order
    pub fn schemas(&self) -> &Map<String, Value> {
        &self.schemas
    }

    /// Open the configured engine, or return the open one
    pub async fn connect(&self) -> DbResult<Arc<dyn Engine>> {
        if let Some(engine) = self.connection() {
            return Ok(engine);
        }

        let memory = match self.config.engine {
            EngineKind::Memory => Some(Arc::new(MemoryEngine::new())),
            EngineKind::MongoDb => None,
        };
        let engine: Arc<dyn Engine> = match &memory {
            Some(memory) => memory.clone(),
            None => open_mongo(&self.config).await?,
        };

        let mut slot = self.engine.write();
        match slot.as_ref() {
            // Lost a race with a concurrent connect; keep the first engine
            Some(existing) => Ok(existing.clone()),
            None => {
                info!("Connected to {} engine", engine.name());
                *slot = Some(engine.clone());
                if let Some(memory) = memory {
                    self.start_ttl_worker(memory);
                }
                Ok(engine)
            }
        }
    }

    /// Engine swept by the background TTL worker, if one is running
    #[cfg(test)]
    pub(crate) fn ttl_target(&self) -> Option<Arc<MemoryEngine>> {
        self.ttl_task
            .lock()
            .as_ref()
            .map(|(_, engine)| engine.clone())
    }

    fn start_ttl_worker(&self, engine: Arc<MemoryEngine>) {
        let worker = Arc::new(TtlWorker::new(engine.clone()).with_interval(self.config.ttl_interval));
        let previous = self
            .ttl_task
            .lock()
            .replace((tokio::spawn(worker.start()), engine));
        if let Some((previous, _)) = previous {
            previous.abort();
        }
    }

    /// Close the connection. Built tables and sequences are dropped with it.
    pub async fn disconnect(&self) -> DbResult<()> {
        let engine = self.engine.write().take();
        if let Some((task, _)) = self.ttl_task.lock().take() {
            task.abort();
        }
        self.tables.clear();
        self.sequences.clear();

        if let Some(engine) = engine {
            engine.close().await?;
            info!("Disconnected from {} engine", engine.name());
        }
        Ok(())
    }

    /// Build a table for every registered schema that has none yet
    pub async fn sync(&self) -> DbResult<()> {
        let engine = self.connect().await?;

        for (name, schema) in &self.schemas {
            if self.tables.contains_key(name) {
                debug!(table = %name, "Table already built, skipping");
                continue;
            }
            let table = self.build_table(name, schema, engine.clone()).await?;
            self.tables.insert(name.clone(), Arc::new(table));
        }
        Ok(())
    }

    async fn build_table(&self, name: &str, schema: &Value, engine: Arc<dyn Engine>) -> DbResult<Table> {
        let root = schema.as_object().ok_or_else(|| {
            DbError::ConfigurationError(format!("schema '{}' must be a mapping", name))
        })?;
        let key = flatten_keys(root.get("key"))?;
        let fields: Vec<String> = properties_of(root)?.keys().cloned().collect();

        let storage = self.converters.schema.convert(schema)?;
        let validation = self.converters.validator.convert(schema)?;

        let spec = StorageDefinition::from_value(&storage)?.collection_spec(name)?;
        let validator = SchemaValidator::new(name, validation)?;
        engine.provision(&spec).await?;

        info!(
            "Built table '{}' ({} fields, {} indexes)",
            name,
            fields.len(),
            spec.indexes.len()
        );
        Ok(Table::new(name, engine, validator, key, fields))
    }

    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).map(|entry| entry.value().clone())
    }

    /// Names of built tables, sorted
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Counter for `key`, shared by every caller asking for the same key and collection
    pub fn sequence(&self, key: &str, options: SequenceOptions) -> DbResult<Arc<Sequence>> {
        let engine = self.connection().ok_or(DbError::NotConnected)?;
        let collection = options
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_SEQUENCE_COLLECTION.to_string());

        let sequence = self
            .sequences
            .entry((collection, key.to_string()))
            .or_insert_with(|| Arc::new(Sequence::new(engine, key, options)))
            .value()
            .clone();
        Ok(sequence)
    }

    /// The open engine, if connected
    pub fn connection(&self) -> Option<Arc<dyn Engine>> {
        self.engine.read().clone()
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("engine", &self.config.engine)
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .field("tables", &self.tables())
            .finish()
    }
}

#[cfg(feature = "mongodb")]
async fn open_mongo(config: &AdapterConfig) -> DbResult<Arc<dyn Engine>> {
    Ok(Arc::new(crate::storage::MongoEngine::connect(config).await?))
}

#[cfg(not(feature = "mongodb"))]
async fn open_mongo(_config: &AdapterConfig) -> DbResult<Arc<dyn Engine>> {
    Err(DbError::ConfigurationError(
        "the mongodb engine requires building with the `mongodb` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sequence_requires_connection() {
        let adapter = Adapter::new(AdapterConfig::memory());
        assert!(matches!(
            adapter.sequence("orders", SequenceOptions::default()),
            Err(DbError::NotConnected)
        ));

        adapter.connect().await.unwrap();
        let first = adapter.sequence("orders", SequenceOptions::default()).unwrap();
        let again = adapter.sequence("orders", SequenceOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn test_connect_reuses_engine() {
        let adapter = Adapter::new(AdapterConfig::memory());
        let first = adapter.connect().await.unwrap();
        let second = adapter.connect().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        adapter.disconnect().await.unwrap();
        assert!(adapter.connection().is_none());
        adapter.disconnect().await.unwrap();
    }

    fn same_engine(swept: &Arc<MemoryEngine>, live: &Arc<dyn Engine>) -> bool {
        Arc::as_ptr(swept) as *const () == Arc::as_ptr(live) as *const ()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ttl_worker_sweeps_connected_engine() {
        let adapter = Arc::new(Adapter::new(AdapterConfig::memory()));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let adapter = adapter.clone();
                tokio::spawn(async move { adapter.connect().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let live = adapter.connection().unwrap();
        let swept = adapter.ttl_target().unwrap();
        assert!(same_engine(&swept, &live));

        adapter.disconnect().await.unwrap();
        assert!(adapter.ttl_target().is_none());
    }

    #[cfg(not(feature = "mongodb"))]
    #[tokio::test]
    async fn test_mongodb_needs_feature() {
        let adapter = Adapter::new(AdapterConfig::default());
        assert!(matches!(
            adapter.connect().await,
            Err(DbError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_define_is_chainable() {
        let mut adapter = Adapter::new(AdapterConfig::memory());
        adapter
            .define("a", json!({"properties": {}}))
            .define("b", json!({"properties": {}}));
        assert_eq!(adapter.schemas().keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
