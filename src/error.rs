use thiserror::Error;

use crate::storage::schema::ValidationViolation;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Schema compilation failed: {0}")]
    SchemaCompilationError(String),

    #[error("Schema validation failed with {} violation(s)", .0.len())]
    ValidationFailed(Vec<ValidationViolation>),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not connected to a storage engine")]
    NotConnected,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParseError(#[from] toml::de::Error),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Whether the error came from the storage engine rather than this crate
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            DbError::StorageError(_)
                | DbError::UniqueViolation(_)
                | DbError::CollectionNotFound(_)
                | DbError::NotConnected
        )
    }

    /// Violations carried by a validation failure, empty for other errors
    pub fn violations(&self) -> &[ValidationViolation] {
        match self {
            DbError::ValidationFailed(violations) => violations,
            _ => &[],
        }
    }
}

impl serde::Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for DbError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        // E11000 duplicate key
        if let ErrorKind::Write(WriteFailure::WriteError(ref write_error)) = *err.kind {
            if write_error.code == 11000 {
                return DbError::UniqueViolation(write_error.message.clone());
            }
        }
        DbError::StorageError(err.to_string())
    }
}
