//! Schema Conversion Tests
//!
//! Tests for:
//! - Type mapping in storage and validation output
//! - Key fields forced required on both sides
//! - Required list union without duplicates
//! - Index normalization
//! - Required nested objects

use docshape::{ConverterConfig, Converters, SchemaValidator};
use serde_json::{json, Value};

fn converters() -> Converters {
    Converters::new(&ConverterConfig::default())
}

fn product_schema() -> Value {
    json!({
        "key": [["sku"], "region"],
        "properties": {
            "sku": {"type": "string", "required": false},
            "region": {"type": "string"},
            "price": {"type": "number", "minimum": 0},
            "stock": {"type": "integer", "required": true},
            "tags": {"type": "array"},
            "meta": {"type": "object"},
            "active": {"type": "boolean"},
            "when": {"type": "date"}
        },
        "required": ["price", "sku"],
        "description": "catalog entry"
    })
}

#[test]
fn test_storage_types_are_mapped() {
    let storage = converters().schema.convert(&product_schema()).unwrap();
    let properties = &storage["properties"];

    assert_eq!(properties["sku"]["type"], json!("String"));
    assert_eq!(properties["price"]["type"], json!("Number"));
    assert_eq!(properties["stock"]["type"], json!("Number"));
    assert_eq!(properties["tags"]["type"], json!("Array"));
    assert_eq!(properties["meta"]["type"], json!("Mixed"));
    assert_eq!(properties["active"]["type"], json!("Boolean"));
    // unknown tokens pass through
    assert_eq!(properties["when"]["type"], json!("date"));
    // other descriptor attributes survive
    assert_eq!(properties["price"]["minimum"], json!(0));
    assert_eq!(storage["description"], json!("catalog entry"));
}

#[test]
fn test_key_fields_are_required_everywhere() {
    let converters = converters();
    let storage = converters.schema.convert(&product_schema()).unwrap();
    let validation = converters.validator.convert(&product_schema()).unwrap();

    assert_eq!(storage["properties"]["sku"]["required"], json!(true));
    assert_eq!(storage["properties"]["region"]["required"], json!(true));
    assert!(storage["properties"]["tags"].get("required").is_none());

    let required = validation["required"].as_array().unwrap();
    assert!(required.contains(&json!("sku")));
    assert!(required.contains(&json!("region")));
}

#[test]
fn test_required_union_is_ordered_and_unique() {
    let validation = converters().validator.convert(&product_schema()).unwrap();
    assert_eq!(
        validation["required"],
        json!(["sku", "region", "price", "stock"])
    );
    assert_eq!(validation["properties"]["price"]["type"], json!("number"));
    assert_eq!(validation["properties"]["stock"]["type"], json!("integer"));
}

#[test]
fn test_validation_maps_native_tokens_back() {
    let validation = converters()
        .validator
        .convert(&json!({
            "properties": {
                "a": {"type": "Array"},
                "b": {"type": "Boolean"},
                "n": {"type": "Number"},
                "m": {"type": "Mixed"},
                "s": {"type": "String"}
            }
        }))
        .unwrap();
    let types: Vec<&Value> = ["a", "b", "n", "m", "s"]
        .iter()
        .map(|field| &validation["properties"][*field]["type"])
        .collect();
    assert_eq!(
        types,
        vec![
            &json!("array"),
            &json!("boolean"),
            &json!("number"),
            &json!("object"),
            &json!("string")
        ]
    );
    assert_eq!(validation["required"], json!([]));
}

#[test]
fn test_compound_index_from_names() {
    let storage = converters()
        .schema
        .convert(&json!({
            "properties": {"a": {"type": "string"}, "b": {"type": "string"}},
            "indexes": [["a", "b"], {"unique": true}]
        }))
        .unwrap();
    assert_eq!(storage["indexes"], json!([[{"a": 1, "b": 1}, {"unique": true}]]));
}

#[test]
fn test_index_mapping_with_fields() {
    let storage = converters()
        .schema
        .convert(&json!({
            "properties": {"a": {"type": "string"}},
            "indexes": [{"fields": ["a"], "sparse": true}]
        }))
        .unwrap();
    assert_eq!(storage["indexes"], json!([[{"a": 1}, {"sparse": true}]]));
}

#[test]
fn test_key_synthesizes_unique_index() {
    let storage = converters()
        .schema
        .convert(&json!({
            "key": ["a", "b"],
            "properties": {"a": {"type": "string"}, "b": {"type": "integer"}}
        }))
        .unwrap();
    assert_eq!(storage["indexes"], json!([[{"a": 1, "b": 1}, {"unique": true}]]));
}

#[test]
fn test_nested_entities_are_converted() {
    let storage = converters()
        .schema
        .convert(&json!({
            "properties": {"address": {"type": "object"}},
            "definitions": {
                "address": {
                    "key": "zip",
                    "properties": {"zip": {"type": "string"}}
                }
            }
        }))
        .unwrap();
    let nested = &storage["definitions"]["address"];
    assert_eq!(nested["properties"]["zip"]["type"], json!("String"));
    assert_eq!(nested["properties"]["zip"]["required"], json!(true));
    assert_eq!(nested["indexes"], json!([[{"zip": 1}, {"unique": true}]]));
}

#[test]
fn test_conversion_is_idempotent_on_storage_output() {
    let converters = converters();
    let once = converters.schema.convert(&product_schema()).unwrap();
    let twice = converters.schema.convert(&once).unwrap();
    assert_eq!(once["properties"], twice["properties"]);
}

#[test]
fn test_undeclared_key_field_fails() {
    let result = converters().schema.convert(&json!({
        "key": "missing",
        "properties": {"a": {"type": "string"}}
    }));
    assert!(result.is_err());
}

#[test]
fn test_nested_object_required_by_entity_list() {
    let schema = json!({
        "required": ["address"],
        "properties": {
            "address": {"type": "object", "properties": {"zip": {"type": "string"}}}
        }
    });
    let converters = converters();
    let storage = converters.schema.convert(&schema).unwrap();
    let validation = converters.validator.convert(&schema).unwrap();

    let address = &storage["properties"]["address"];
    assert_eq!(address["type"], json!("Mixed"));
    assert_eq!(address["required"], json!(true));
    assert_eq!(address["properties"]["zip"]["type"], json!("String"));
    assert_eq!(validation["required"], json!(["address"]));

    // storage output carries the flag and converts again
    let again = converters.schema.convert(&storage).unwrap();
    assert_eq!(again["properties"], storage["properties"]);
}

#[test]
fn test_nested_object_required_by_flag() {
    let schema = json!({
        "properties": {
            "address": {
                "type": "object",
                "required": true,
                "properties": {"zip": {"type": "string"}}
            }
        }
    });
    let converters = converters();
    let storage = converters.schema.convert(&schema).unwrap();
    let validation = converters.validator.convert(&schema).unwrap();

    assert_eq!(storage["properties"]["address"]["required"], json!(true));
    assert_eq!(validation["required"], json!(["address"]));
    assert_eq!(validation["properties"]["address"]["required"], json!([]));

    let validator = SchemaValidator::new("people", validation).unwrap();
    assert!(validator.is_valid(&json!({"address": {"zip": "75001"}})));
    assert!(!validator.is_valid(&json!({})));
    assert!(!validator.is_valid(&json!({"address": {"zip": 75001}})));
}

#[test]
fn test_nested_object_with_key() {
    let storage = converters()
        .schema
        .convert(&json!({
            "required": ["address"],
            "properties": {
                "address": {
                    "type": "object",
                    "key": "zip",
                    "properties": {"zip": {"type": "string"}}
                }
            }
        }))
        .unwrap();
    let address = &storage["properties"]["address"];
    assert_eq!(address["required"], json!(true));
    assert_eq!(address["properties"]["zip"]["required"], json!(true));
    assert_eq!(address["indexes"], json!([[{"zip": 1}, {"unique": true}]]));
}

#[test]
fn test_field_named_required_keeps_its_descriptor() {
    let converters = converters();
    let schema = json!({
        "key": "id",
        "properties": {"id": {"type": "integer"}, "required": {"type": "boolean"}}
    });
    let validation = converters.validator.convert(&schema).unwrap();
    assert_eq!(validation["properties"]["required"]["type"], json!("boolean"));

    let validator = SchemaValidator::new("flags", validation).unwrap();
    assert!(validator.is_valid(&json!({"id": 1, "required": true})));
    assert!(!validator.is_valid(&json!({"id": 1, "required": "not-a-bool"})));
}
