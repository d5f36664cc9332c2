//! Generic schema conversion
//!
//! Both converters share one recursive walk over the schema tree: arrays are
//! converted element-wise, mappings key-by-key in their original order, and
//! every other value is a leaf returned as-is. A mapping that carries
//! `properties` is an entity node; when the walk reaches one of its keys the
//! converter's [`EntityRules`] may inject synthesized siblings, which are then
//! walked like any other value.

pub mod schema;
pub mod types;
pub mod validator;

pub use schema::SchemaConverter;
pub use types::{ConverterConfig, NativeType, TypeMap};
pub use validator::ValidatorConverter;

use serde_json::{Map, Value};

use crate::error::{DbError, DbResult};

/// Hooks applied to entity nodes during the walk
pub trait EntityRules {
    /// Inject synthesized fields into `out` when the walk reaches `field` of `entity`
    fn inject(
        &self,
        entity: &Map<String, Value>,
        field: &str,
        out: &mut Map<String, Value>,
    ) -> DbResult<()>;
}

/// Recursive-descent transform shared by the converters
pub fn walk<R: EntityRules + ?Sized>(rules: &R, node: &Value) -> DbResult<Value> {
    match node {
        Value::Array(items) => items
            .iter()
            .map(|item| walk(rules, item))
            .collect::<DbResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let entity = map.contains_key("properties");
            let mut out = Map::new();
            for (field, value) in map {
                if entity {
                    rules.inject(map, field, &mut out)?;
                }
                // Synthesized values take precedence over the raw ones
                let converted = match out.get(field) {
                    Some(injected) => walk(rules, injected)?,
                    None => walk(rules, value)?,
                };
                out.insert(field.clone(), converted);
            }
            Ok(Value::Object(out))
        }
        leaf => Ok(leaf.clone()),
    }
}

/// Flatten a `key` declaration (name, names, or nested names) into field names
pub fn flatten_keys(key: Option<&Value>) -> DbResult<Vec<String>> {
    fn collect(value: &Value, names: &mut Vec<String>) -> DbResult<()> {
        match value {
            Value::String(name) => {
                names.push(name.clone());
                Ok(())
            }
            Value::Array(items) => items.iter().try_for_each(|item| collect(item, names)),
            other => Err(DbError::ConfigurationError(format!(
                "key entries must be field names, got {}",
                other
            ))),
        }
    }

    let mut names = Vec::new();
    match key {
        None | Some(Value::Null) => {}
        Some(value) => collect(value, &mut names)?,
    }
    Ok(names)
}

/// Field names listed in an entity-level `required` sequence
///
/// A boolean is the node's own flag as a field of its parent entity and
/// names nothing.
pub fn required_names(required: Option<&Value>) -> DbResult<Vec<String>> {
    match required {
        None | Some(Value::Null) | Some(Value::Bool(_)) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    DbError::ConfigurationError(format!(
                        "required entries must be field names, got {}",
                        item
                    ))
                })
            })
            .collect(),
        Some(other) => Err(DbError::ConfigurationError(format!(
            "required must be a sequence of field names, got {}",
            other
        ))),
    }
}

/// The `properties` mapping of an entity node
pub(crate) fn properties_of(entity: &Map<String, Value>) -> DbResult<&Map<String, Value>> {
    entity
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| DbError::ConfigurationError("'properties' must be a mapping".to_string()))
}

/// A field descriptor, which must be a mapping
pub(crate) fn descriptor_of<'a>(name: &str, descriptor: &'a Value) -> DbResult<&'a Map<String, Value>> {
    descriptor.as_object().ok_or_else(|| {
        DbError::ConfigurationError(format!("descriptor of field '{}' must be a mapping", name))
    })
}

/// Both converters built from one converter configuration
#[derive(Debug, Clone, Default)]
pub struct Converters {
    pub schema: SchemaConverter,
    pub validator: ValidatorConverter,
}

impl Converters {
    pub fn new(config: &ConverterConfig) -> Self {
        let types = TypeMap::new(config);
        Self {
            schema: SchemaConverter::new(types.clone()),
            validator: ValidatorConverter::new(types),
        }
    }
}
