//! Type vocabularies
//!
//! Generic schemas use the JSON Schema type names. Storage definitions use the
//! native names understood by the engines, and validation definitions map
//! native names back to the JSON Schema names.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Closed vocabulary of generic field types
pub const GENERIC_TYPES: [&str; 6] = ["array", "boolean", "integer", "number", "object", "string"];

/// Native field type used by storage definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeType {
    Array,
    Boolean,
    Number,
    Mixed,
    String,
}

impl NativeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NativeType::Array => "Array",
            NativeType::Boolean => "Boolean",
            NativeType::Number => "Number",
            NativeType::Mixed => "Mixed",
            NativeType::String => "String",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "Array" => Some(NativeType::Array),
            "Boolean" => Some(NativeType::Boolean),
            "Number" => Some(NativeType::Number),
            "Mixed" => Some(NativeType::Mixed),
            "String" => Some(NativeType::String),
            _ => None,
        }
    }

    /// Native type for a generic token
    pub fn from_generic(token: &str) -> Option<Self> {
        match token {
            "array" => Some(NativeType::Array),
            "boolean" => Some(NativeType::Boolean),
            "integer" | "number" => Some(NativeType::Number),
            "object" => Some(NativeType::Mixed),
            "string" => Some(NativeType::String),
            _ => None,
        }
    }

    /// Validation (JSON Schema) name of a native type
    pub fn validation_name(&self) -> &'static str {
        match self {
            NativeType::Array => "array",
            NativeType::Boolean => "boolean",
            NativeType::Number => "number",
            NativeType::Mixed => "object",
            NativeType::String => "string",
        }
    }

    /// Whether a stored value is acceptable for this type. Null is always accepted.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (_, Value::Null) | (NativeType::Mixed, _) => true,
            (NativeType::Array, Value::Array(_)) => true,
            (NativeType::Boolean, Value::Bool(_)) => true,
            (NativeType::Number, Value::Number(_)) => true,
            (NativeType::String, Value::String(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for NativeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converter configuration, the `converter` key of the adapter config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Extra generic → native token mappings, e.g. `date = "Date"`
    pub types: BTreeMap<String, String>,
}

/// Resolved token maps shared by both converters
#[derive(Debug, Clone)]
pub struct TypeMap {
    storage: HashMap<String, String>,
    validation: HashMap<String, String>,
}

impl TypeMap {
    pub fn new(config: &ConverterConfig) -> Self {
        let mut storage: HashMap<String, String> = GENERIC_TYPES
            .iter()
            .filter_map(|generic| {
                NativeType::from_generic(generic)
                    .map(|native| (generic.to_string(), native.as_str().to_string()))
            })
            .collect();
        for (generic, native) in &config.types {
            storage.insert(generic.clone(), native.clone());
        }

        let mut validation: HashMap<String, String> = [
            NativeType::Array,
            NativeType::Boolean,
            NativeType::Number,
            NativeType::Mixed,
            NativeType::String,
        ]
        .iter()
        .map(|native| (native.as_str().to_string(), native.validation_name().to_string()))
        .collect();
        for (generic, native) in &config.types {
            validation
                .entry(native.clone())
                .or_insert_with(|| generic.clone());
        }

        Self {
            storage,
            validation,
        }
    }

    /// Storage token for `token`, or `token` itself when unmapped
    pub fn storage<'a>(&'a self, token: &'a str) -> &'a str {
        self.storage.get(token).map(String::as_str).unwrap_or(token)
    }

    /// Validation token for `token`, or `token` itself when unmapped
    pub fn validation<'a>(&'a self, token: &'a str) -> &'a str {
        self.validation.get(token).map(String::as_str).unwrap_or(token)
    }
}

impl Default for TypeMap {
    fn default() -> Self {
        Self::new(&ConverterConfig::default())
    }
}
