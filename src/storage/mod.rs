pub mod definition;
pub mod document;
pub mod engine;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod schema;

pub use definition::{CollectionSpec, FieldSpec, IndexSpec, StorageDefinition, Timestamps, TtlSpec};
pub use document::{Document, ID_FIELD};
pub use engine::{Engine, QueryOptions};
pub use memory::MemoryEngine;
#[cfg(feature = "mongodb")]
pub use mongo::MongoEngine;
pub use schema::{SchemaValidator, ValidationViolation};
