//! JSON Schema validation of documents
//!
//! Validation definitions keep per-field `required: true` flags next to the
//! flat `required` list. JSON Schema only understands the list form, so the
//! flags are stripped before the schema is compiled.

use jsonschema::validator_for;
use serde_json::Value;

use crate::error::{DbError, DbResult};

/// Compiled schema validator
pub struct SchemaValidator {
    name: String,
    definition: Value,
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile a validation definition
    pub fn new(name: &str, definition: Value) -> DbResult<Self> {
        let schema = json_schema(&definition);
        let validator = validator_for(&schema)
            .map_err(|e| DbError::SchemaCompilationError(format!("{}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            definition,
            validator,
        })
    }

    /// Validate a document, collecting every violation
    pub fn validate(&self, document: &Value) -> DbResult<()> {
        let violations: Vec<ValidationViolation> = self
            .validator
            .iter_errors(document)
            .map(|e| ValidationViolation {
                instance_path: e.instance_path().to_string(),
                schema_path: e.schema_path().to_string(),
                error: e.to_string(),
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            tracing::debug!(
                schema = %self.name,
                violations = violations.len(),
                "Document rejected by schema"
            );
            Err(DbError::ValidationFailed(violations))
        }
    }

    pub fn is_valid(&self, document: &Value) -> bool {
        self.validator.is_valid(document)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The validation definition the validator was compiled from
    pub fn definition(&self) -> &Value {
        &self.definition
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("name", &self.name)
            .finish()
    }
}

/// Individual schema violation detail
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationViolation {
    /// JSON Pointer to the violating instance
    pub instance_path: String,
    /// JSON Pointer to the schema keyword that failed
    pub schema_path: String,
    /// Human-readable error message
    pub error: String,
}

/// Copy of `definition` with boolean `required` flags removed
///
/// Keys of a `properties` mapping are field names and are never filtered.
pub fn json_schema(definition: &Value) -> Value {
    match definition {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, value)| key.as_str() != "required" || !value.is_boolean())
                .map(|(key, value)| match (key.as_str(), value) {
                    ("properties", Value::Object(fields)) => (
                        key.clone(),
                        Value::Object(
                            fields
                                .iter()
                                .map(|(name, descriptor)| (name.clone(), json_schema(descriptor)))
                                .collect(),
                        ),
                    ),
                    _ => (key.clone(), json_schema(value)),
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(json_schema).collect()),
        leaf => leaf.clone(),
    }
}
