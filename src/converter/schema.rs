//! Generic schema → storage definition

use serde_json::{json, Map, Value};

use super::types::TypeMap;
use super::{descriptor_of, flatten_keys, properties_of, required_names, walk, EntityRules};
use crate::error::{DbError, DbResult};

/// Rewrites generic schemas into storage definitions
#[derive(Debug, Clone, Default)]
pub struct SchemaConverter {
    types: TypeMap,
}

impl SchemaConverter {
    pub fn new(types: TypeMap) -> Self {
        Self { types }
    }

    /// Convert a generic schema tree into a storage definition tree
    pub fn convert(&self, schema: &Value) -> DbResult<Value> {
        walk(self, schema)
    }

    /// Properties with native types and forced `required` flags
    pub fn properties(&self, entity: &Map<String, Value>) -> DbResult<Map<String, Value>> {
        let mut result = Map::new();
        for (name, descriptor) in properties_of(entity)? {
            let mut field = descriptor_of(name, descriptor)?.clone();
            if let Some(Value::String(token)) = field.get("type") {
                let native = self.types.storage(token).to_string();
                field.insert("type".to_string(), Value::String(native));
            }
            result.insert(name.clone(), Value::Object(field));
        }

        let mut forced = required_names(entity.get("required"))?;
        forced.extend(flatten_keys(entity.get("key"))?);
        for name in forced {
            let field = result
                .get_mut(&name)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| {
                    DbError::ConfigurationError(format!(
                        "required field '{}' is not declared in properties",
                        name
                    ))
                })?;
            field.insert("required".to_string(), Value::Bool(true));
        }

        Ok(result)
    }

    /// Normalized `[fields, options]` index tuples plus the synthesized key index
    pub fn indexes(&self, entity: &Map<String, Value>) -> DbResult<Vec<Value>> {
        let mut result = match entity.get("indexes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(declarations)) => declarations
                .iter()
                .map(normalize_index)
                .collect::<DbResult<Vec<_>>>()?,
            Some(other) => {
                return Err(DbError::ConfigurationError(format!(
                    "indexes must be a sequence, got {}",
                    other
                )))
            }
        };

        let keys = flatten_keys(entity.get("key"))?;
        if !keys.is_empty() {
            result.push(json!([weighted(keys.iter()), {"unique": true}]));
        }

        Ok(result)
    }
}

impl EntityRules for SchemaConverter {
    fn inject(
        &self,
        entity: &Map<String, Value>,
        field: &str,
        out: &mut Map<String, Value>,
    ) -> DbResult<()> {
        match field {
            "properties" => {
                out.insert("properties".to_string(), Value::Object(self.properties(entity)?));
            }
            "key" | "indexes" if !out.contains_key("indexes") => {
                out.insert("indexes".to_string(), Value::Array(self.indexes(entity)?));
            }
            _ => {}
        }
        Ok(())
    }
}

/// `{name: 1, ...}` for a list of field names
fn weighted<'a>(names: impl Iterator<Item = &'a String>) -> Value {
    Value::Object(names.map(|name| (name.clone(), json!(1))).collect())
}

/// Field map of an index from either a mapping or a sequence of names
fn index_fields(fields: &Value) -> DbResult<Value> {
    match fields {
        Value::Object(_) => Ok(fields.clone()),
        Value::String(name) => Ok(json!({ name.clone(): 1 })),
        Value::Array(names) => {
            let names = names
                .iter()
                .map(|name| {
                    name.as_str().map(str::to_string).ok_or_else(|| {
                        DbError::ConfigurationError(format!(
                            "index fields must be field names, got {}",
                            name
                        ))
                    })
                })
                .collect::<DbResult<Vec<_>>>()?;
            Ok(weighted(names.iter()))
        }
        other => Err(DbError::ConfigurationError(format!(
            "unsupported index fields {}",
            other
        ))),
    }
}

fn normalize_index(declaration: &Value) -> DbResult<Value> {
    match declaration {
        Value::Array(parts) => {
            let fields = match parts.first() {
                Some(Value::String(_)) => {
                    // a plain list of names is one compound index
                    weighted(parts.iter().filter_map(|part| match part {
                        Value::String(name) => Some(name),
                        _ => None,
                    }))
                }
                Some(first) => index_fields(first)?,
                None => {
                    return Err(DbError::ConfigurationError(
                        "index declaration must not be empty".to_string(),
                    ))
                }
            };
            let options = match parts.get(1) {
                Some(Value::Object(options)) => Value::Object(options.clone()),
                _ => json!({}),
            };
            Ok(json!([fields, options]))
        }
        Value::Object(index) => match index.get("fields") {
            Some(fields) => {
                let fields = index_fields(fields)?;
                let mut options: Map<String, Value> = index
                    .iter()
                    .filter(|(name, _)| name.as_str() != "fields")
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                if options.len() == 1 {
                    if let Some(Value::Object(nested)) = options.get("options") {
                        options = nested.clone();
                    }
                }
                Ok(json!([fields, options]))
            }
            None => Ok(json!([declaration.clone(), {}])),
        },
        Value::String(name) => Ok(json!([{ name.clone(): 1 }, {}])),
        other => Err(DbError::ConfigurationError(format!(
            "unsupported index declaration {}",
            other
        ))),
    }
}
