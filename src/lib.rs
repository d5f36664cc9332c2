pub mod adapter;
pub mod callback;
pub mod config;
pub mod converter;
pub mod error;
pub mod sequence;
pub mod storage;
pub mod table;
pub mod ttl;

pub use adapter::Adapter;
pub use config::{AdapterConfig, EngineKind};
pub use converter::{ConverterConfig, Converters, NativeType, SchemaConverter, ValidatorConverter};
pub use error::{DbError, DbResult};
pub use sequence::{Sequence, SequenceOptions};
pub use storage::{Document, Engine, MemoryEngine, QueryOptions, SchemaValidator, ValidationViolation};
pub use table::{SetOptions, Table};
pub use ttl::TtlWorker;
