//! Generic schema → validation definition

use serde_json::{Map, Value};

use super::types::TypeMap;
use super::{descriptor_of, flatten_keys, properties_of, required_names, walk, EntityRules};
use crate::error::DbResult;

/// Rewrites generic schemas into validation definitions
#[derive(Debug, Clone, Default)]
pub struct ValidatorConverter {
    types: TypeMap,
}

impl ValidatorConverter {
    pub fn new(types: TypeMap) -> Self {
        Self { types }
    }

    /// Convert a generic schema tree into a validation definition tree
    pub fn convert(&self, schema: &Value) -> DbResult<Value> {
        walk(self, schema)
    }

    /// Properties with validation type names
    pub fn properties(&self, entity: &Map<String, Value>) -> DbResult<Map<String, Value>> {
        let mut result = Map::new();
        for (name, descriptor) in properties_of(entity)? {
            let mut field = descriptor_of(name, descriptor)?.clone();
            if let Some(Value::String(token)) = field.get("type") {
                let mapped = self.types.validation(token).to_string();
                field.insert("type".to_string(), Value::String(mapped));
            }
            result.insert(name.clone(), Value::Object(field));
        }
        Ok(result)
    }

    /// Key fields, entity-level required fields and flagged fields, first occurrence wins
    pub fn required(&self, entity: &Map<String, Value>) -> DbResult<Vec<String>> {
        let mut names = flatten_keys(entity.get("key"))?;
        names.extend(required_names(entity.get("required"))?);
        names.extend(
            properties_of(entity)?
                .iter()
                .filter(|(_, descriptor)| descriptor.get("required") == Some(&Value::Bool(true)))
                .map(|(name, _)| name.clone()),
        );

        let mut seen = std::collections::HashSet::new();
        names.retain(|name| seen.insert(name.clone()));
        Ok(names)
    }
}

impl EntityRules for ValidatorConverter {
    fn inject(
        &self,
        entity: &Map<String, Value>,
        field: &str,
        out: &mut Map<String, Value>,
    ) -> DbResult<()> {
        if field == "properties" {
            out.insert("properties".to_string(), Value::Object(self.properties(entity)?));
            let required = self.required(entity)?.into_iter().map(Value::String).collect();
            out.insert("required".to_string(), Value::Array(required));
        }
        Ok(())
    }
}
