//! Output schema generation and structural validation
//!
//! The validator checks a candidate value against the subset of JSON Schema
//! the providers actually emit constraints for: `type`, `required`,
//! `properties`, `items`, `enum`, `additionalProperties: false`, and local
//! `#/definitions` references. Keywords it does not understand impose no
//! constraint. Invalid values are reported, never coerced.

use schemars::JsonSchema;
use serde_json::{json, Value};
use std::fmt;

/// Generate the JSON schema for a Rust type as a plain `Value`
pub fn schema_for<T: JsonSchema>() -> Value {
    let root = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
    serde_json::to_value(root).unwrap_or_else(|_| json!({ "type": "object" }))
}

/// A single schema violation, with the JSON path where it occurred
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.path, self.message)
    }
}

/// Validate a candidate value against a schema.
///
/// Returns the first violation found, or Ok if the candidate conforms.
pub fn validate(schema: &Value, candidate: &Value) -> Result<(), SchemaViolation> {
    validate_at("$", schema, candidate, schema)
}

fn validate_at(
    path: &str,
    schema: &Value,
    candidate: &Value,
    root: &Value,
) -> Result<(), SchemaViolation> {
    // Resolve local references before anything else
    if let Some(reference) = schema.get("$ref").and_then(|r| r.as_str()) {
        let resolved = resolve_ref(reference, root).ok_or_else(|| SchemaViolation {
            path: path.to_string(),
            message: format!("unresolvable reference '{}'", reference),
        })?;
        return validate_at(path, resolved, candidate, root);
    }

    if let Some(expected) = schema.get("type").and_then(|t| t.as_str()) {
        if !type_matches(expected, candidate) {
            return Err(SchemaViolation {
                path: path.to_string(),
                message: format!("expected type '{}', got {}", expected, type_name(candidate)),
            });
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(candidate) {
            return Err(SchemaViolation {
                path: path.to_string(),
                message: format!("value {} is not one of the allowed values", candidate),
            });
        }
    }

    if let Value::Object(fields) = candidate {
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for key in required.iter().filter_map(|k| k.as_str()) {
                if !fields.contains_key(key) {
                    return Err(SchemaViolation {
                        path: path.to_string(),
                        message: format!("missing required property '{}'", key),
                    });
                }
            }
        }

        let properties = schema.get("properties").and_then(|p| p.as_object());
        if let Some(properties) = properties {
            for (key, value) in fields {
                if let Some(subschema) = properties.get(key) {
                    validate_at(&format!("{}.{}", path, key), subschema, value, root)?;
                } else if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                    return Err(SchemaViolation {
                        path: path.to_string(),
                        message: format!("unexpected property '{}'", key),
                    });
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (candidate, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            validate_at(&format!("{}[{}]", path, i), item_schema, item, root)?;
        }
    }

    Ok(())
}

fn resolve_ref<'a>(reference: &str, root: &'a Value) -> Option<&'a Value> {
    let name = reference.strip_prefix("#/definitions/")?;
    root.get("definitions")?.get(name)
}

fn type_matches(expected: &str, candidate: &Value) -> bool {
    match expected {
        "object" => candidate.is_object(),
        "array" => candidate.is_array(),
        "string" => candidate.is_string(),
        "number" => candidate.is_number(),
        "integer" => candidate.is_i64() || candidate.is_u64(),
        "boolean" => candidate.is_boolean(),
        "null" => candidate.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Person {
        name: String,
        age: u32,
    }

    static PERSON_SCHEMA: Lazy<Value> = Lazy::new(schema_for::<Person>);

    #[test]
    fn test_schema_for_derives_object_schema() {
        assert_eq!(PERSON_SCHEMA["type"], "object");
        assert_eq!(PERSON_SCHEMA["properties"]["name"]["type"], "string");
        let required = PERSON_SCHEMA["required"].as_array().unwrap();
        assert!(required.contains(&json!("name")));
        assert!(required.contains(&json!("age")));
    }

    #[test]
    fn test_valid_candidate_passes() {
        let candidate = json!({ "name": "Ada", "age": 36 });
        assert!(validate(&PERSON_SCHEMA, &candidate).is_ok());
    }

    #[test]
    fn test_missing_required_property() {
        let candidate = json!({ "name": "Ada" });

        let violation = validate(&PERSON_SCHEMA, &candidate).unwrap_err();
        assert!(violation.message.contains("missing required property 'age'"));
    }

    #[test]
    fn test_wrong_type_reports_path() {
        let candidate = json!({ "name": "Ada", "age": "thirty-six" });

        let violation = validate(&PERSON_SCHEMA, &candidate).unwrap_err();
        assert_eq!(violation.path, "$.age");
        assert!(violation.message.contains("expected type"));
    }

    #[test]
    fn test_enum_constraint() {
        let schema = json!({ "type": "string", "enum": ["a", "b", "reject"] });
        assert!(validate(&schema, &json!("a")).is_ok());

        let violation = validate(&schema, &json!("c")).unwrap_err();
        assert!(violation.message.contains("allowed values"));
    }

    #[test]
    fn test_additional_properties_false() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "additionalProperties": false
        });

        let violation = validate(&schema, &json!({ "name": "x", "extra": 1 })).unwrap_err();
        assert!(violation.message.contains("unexpected property 'extra'"));
    }

    #[test]
    fn test_local_ref_resolution() {
        let schema = json!({
            "type": "object",
            "properties": { "kind": { "$ref": "#/definitions/Kind" } },
            "definitions": { "Kind": { "type": "string", "enum": ["x", "y"] } }
        });

        assert!(validate(&schema, &json!({ "kind": "x" })).is_ok());
        assert!(validate(&schema, &json!({ "kind": "z" })).is_err());
    }

    #[test]
    fn test_array_items() {
        let schema = json!({ "type": "array", "items": { "type": "number" } });
        assert!(validate(&schema, &json!([1, 2, 3])).is_ok());

        let violation = validate(&schema, &json!([1, "two"])).unwrap_err();
        assert_eq!(violation.path, "$[1]");
    }
}
