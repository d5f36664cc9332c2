//! Typed view of storage definitions and the provisioning request built from them

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::converter::NativeType;
use crate::error::{DbError, DbResult};

pub const DEFAULT_CREATED_AT: &str = "created_at";
pub const DEFAULT_UPDATED_AT: &str = "updated_at";

/// Names of the timestamp fields maintained by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: String,
    pub updated_at: String,
}

impl Default for Timestamps {
    fn default() -> Self {
        Self {
            created_at: DEFAULT_CREATED_AT.to_string(),
            updated_at: DEFAULT_UPDATED_AT.to_string(),
        }
    }
}

/// Expiry of documents based on a timestamp field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlSpec {
    pub field: String,
    pub expire_after_seconds: u64,
}

/// A declared field of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Type token as written in the storage definition
    pub type_token: Option<String>,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: &str, native: NativeType) -> Self {
        Self {
            name: name.to_string(),
            type_token: Some(native.as_str().to_string()),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Native type when the token belongs to the native vocabulary
    pub fn native_type(&self) -> Option<NativeType> {
        self.type_token.as_deref().and_then(NativeType::parse)
    }
}

/// A normalized index: ordered field weights plus options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub fields: Vec<(String, Value)>,
    pub unique: bool,
    pub sparse: bool,
    pub name: Option<String>,
    pub expire_after_seconds: Option<u64>,
    /// Options not understood by this crate, handed to the engine untouched
    pub extra: Map<String, Value>,
}

impl IndexSpec {
    /// Ascending index over `fields`
    pub fn ascending<S: AsRef<str>>(fields: &[S]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|field| (field.as_ref().to_string(), Value::from(1)))
                .collect(),
            unique: false,
            sparse: false,
            name: None,
            expire_after_seconds: None,
            extra: Map::new(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Parse a `[fields, options]` tuple produced by the schema converter
    pub fn from_tuple(tuple: &Value) -> DbResult<Self> {
        let (fields, options) = match tuple.as_array().map(Vec::as_slice) {
            Some([Value::Object(fields), Value::Object(options)]) => (fields, options),
            _ => {
                return Err(DbError::ConfigurationError(format!(
                    "index must be a [fields, options] pair, got {}",
                    tuple
                )))
            }
        };
        if fields.is_empty() {
            return Err(DbError::ConfigurationError(
                "index must cover at least one field".to_string(),
            ));
        }

        let mut spec = IndexSpec {
            fields: fields
                .iter()
                .map(|(name, weight)| (name.clone(), weight.clone()))
                .collect(),
            unique: false,
            sparse: false,
            name: None,
            expire_after_seconds: None,
            extra: Map::new(),
        };

        for (option, value) in options {
            match (option.as_str(), value) {
                ("unique", Value::Bool(flag)) => spec.unique = *flag,
                ("sparse", Value::Bool(flag)) => spec.sparse = *flag,
                ("name", Value::String(name)) => spec.name = Some(name.clone()),
                ("expireAfterSeconds" | "expires", value) => {
                    spec.expire_after_seconds = Some(seconds(value)?)
                }
                _ => {
                    spec.extra.insert(option.clone(), value.clone());
                }
            }
        }

        Ok(spec)
    }

    /// Field names in index order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Explicit name, or one derived from the fields (`a_1_b_-1`)
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .fields
                .iter()
                .map(|(name, weight)| match weight {
                    Value::String(kind) => format!("{}_{}", name, kind),
                    other => format!("{}_{}", name, other),
                })
                .collect::<Vec<_>>()
                .join("_"),
        }
    }
}

/// Everything an engine needs to provision one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub indexes: Vec<IndexSpec>,
    pub timestamps: Option<Timestamps>,
    pub ttl: Option<TtlSpec>,
}

impl CollectionSpec {
    /// Empty spec without timestamps
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            indexes: Vec::new(),
            timestamps: None,
            ttl: None,
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_timestamps(mut self, timestamps: Timestamps) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn unique_indexes(&self) -> impl Iterator<Item = &IndexSpec> {
        self.indexes.iter().filter(|index| index.unique)
    }
}

/// Storage definition produced by the schema converter
#[derive(Debug, Clone, PartialEq)]
pub struct StorageDefinition {
    pub properties: Map<String, Value>,
    pub indexes: Vec<IndexSpec>,
    pub ttl: Option<u64>,
    pub options: Map<String, Value>,
}

impl StorageDefinition {
    pub fn from_value(definition: &Value) -> DbResult<Self> {
        let root = definition.as_object().ok_or_else(|| {
            DbError::ConfigurationError("storage definition must be a mapping".to_string())
        })?;

        let properties = root
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| {
                DbError::ConfigurationError("'properties' must be a mapping".to_string())
            })?;

        let indexes = match root.get("indexes") {
            Some(Value::Array(tuples)) => tuples
                .iter()
                .map(IndexSpec::from_tuple)
                .collect::<DbResult<Vec<_>>>()?,
            _ => Vec::new(),
        };

        let ttl = match root.get("ttl") {
            None | Some(Value::Null) => None,
            Some(value) => Some(seconds(value)?).filter(|ttl| *ttl > 0),
        };

        let options = match root.get("options") {
            Some(Value::Object(options)) => options.clone(),
            _ => Map::new(),
        };

        Ok(Self {
            properties,
            indexes,
            ttl,
            options,
        })
    }

    /// Timestamp fields from `options.timestamps`, defaulting to created_at/updated_at
    pub fn timestamps(&self) -> DbResult<Option<Timestamps>> {
        match self.options.get("timestamps") {
            None => Ok(Some(Timestamps::default())),
            Some(Value::Bool(false)) | Some(Value::Null) => Ok(None),
            Some(Value::Bool(true)) => Ok(Some(Timestamps {
                created_at: "createdAt".to_string(),
                updated_at: "updatedAt".to_string(),
            })),
            Some(Value::Object(names)) => {
                let name = |key: &str| -> DbResult<String> {
                    match names.get(key) {
                        None => Ok(key.to_string()),
                        Some(Value::String(name)) => Ok(name.clone()),
                        Some(other) => Err(DbError::ConfigurationError(format!(
                            "timestamps.{} must be a field name, got {}",
                            key, other
                        ))),
                    }
                };
                Ok(Some(Timestamps {
                    created_at: name("createdAt")?,
                    updated_at: name("updatedAt")?,
                }))
            }
            Some(other) => Err(DbError::ConfigurationError(format!(
                "unsupported timestamps option {}",
                other
            ))),
        }
    }

    /// Provisioning request for the collection `name`
    pub fn collection_spec(&self, name: &str) -> DbResult<CollectionSpec> {
        let fields = self
            .properties
            .iter()
            .map(|(field, descriptor)| FieldSpec {
                name: field.clone(),
                type_token: descriptor
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                required: descriptor.get("required") == Some(&Value::Bool(true)),
            })
            .collect();

        let timestamps = self.timestamps()?;
        let mut indexes = self.indexes.clone();

        let ttl = match (self.ttl, &timestamps) {
            (None, _) => None,
            (Some(_), None) => {
                return Err(DbError::ConfigurationError(format!(
                    "collection '{}' declares a ttl but disables timestamps",
                    name
                )))
            }
            (Some(seconds), Some(timestamps)) => {
                let mut index = IndexSpec::ascending(&[timestamps.updated_at.as_str()]);
                index.expire_after_seconds = Some(seconds);
                indexes.push(index);
                Some(TtlSpec {
                    field: timestamps.updated_at.clone(),
                    expire_after_seconds: seconds,
                })
            }
        };

        Ok(CollectionSpec {
            name: name.to_string(),
            fields,
            indexes,
            timestamps,
            ttl,
        })
    }
}

fn seconds(value: &Value) -> DbResult<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|s| *s >= 0.0).map(|s| s as u64))
        .ok_or_else(|| {
            DbError::ConfigurationError(format!("expected a number of seconds, got {}", value))
        })
}
