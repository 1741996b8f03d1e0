//! JSON Schema surface for the DSL.
//!
//! The schema is a structural complement to the semantic validator: it
//! describes the accepted document shape for editors and doc tooling, and
//! [`validate_schema`] runs a generic structural check against it.

use serde_json::Value;

/// JSON Schema describing the query document.
pub const QUERY_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "title": "Query",
  "type": "object",
  "properties": {
    "select": { "oneOf": [ { "type": "string" }, { "type": "array", "items": { "type": "string" } } ] },
    "from": { "type": "string" },
    "wheres": { "type": "array", "items": { "type": "object" } },
    "orders": { "oneOf": [ { "type": "string" }, { "type": "array" }, { "type": "object" } ] },
    "groups": { "oneOf": [ { "type": "string" }, { "type": "array" }, { "type": "object" } ] },
    "havings": { "type": "array", "items": { "type": "object" } },
    "unions": { "type": "array", "items": { "type": "object" } },
    "joins": { "type": "array", "items": { "type": "object" } },
    "query": { "type": "object" },
    "alias": { "type": "string" },
    "sql": {
      "type": "object",
      "properties": {
        "stmt": { "type": "string" },
        "args": { "type": "array" },
        "comment": { "type": "string" }
      },
      "required": ["stmt"]
    },
    "first": { "oneOf": [ { "type": "boolean" }, { "type": "integer" }, { "type": "object" } ] },
    "limit": { "oneOf": [ { "type": "integer" }, { "type": "string" } ] },
    "offset": { "oneOf": [ { "type": "integer" }, { "type": "string" } ] },
    "page": { "oneOf": [ { "type": "integer" }, { "type": "string" } ] },
    "pagesize": { "oneOf": [ { "type": "integer" }, { "type": "string" } ] },
    "data-only": { "oneOf": [ { "type": "boolean" }, { "type": "string" } ] },
    "debug": { "type": "boolean" },
    "comment": { "type": "string" }
  }
}"##;

/// Check `data` against [`QUERY_SCHEMA`]. Returns one message per
/// violation; an empty list means the document is structurally acceptable.
pub fn validate_schema(data: &Value) -> Vec<String> {
    let schema: Value = match serde_json::from_str(QUERY_SCHEMA) {
        Ok(schema) => schema,
        Err(_) => return vec!["internal: schema constant is invalid".to_string()],
    };
    let mut errors = Vec::new();
    check(data, &schema, "", &mut errors);
    errors
}

/// Recursive structural check covering the schema subset the DSL uses:
/// `type`, `properties`, `required`, `items`, `enum`, `oneOf`.
fn check(data: &Value, schema: &Value, path: &str, errors: &mut Vec<String>) {
    if let Some(variants) = schema.get("oneOf").and_then(Value::as_array) {
        let matched = variants.iter().any(|variant| {
            let mut probe = Vec::new();
            check(data, variant, path, &mut probe);
            probe.is_empty()
        });
        if !matched {
            errors.push(format!("{}: no accepted shape matches", display(path)));
        }
        return;
    }

    if let Some(expected) = schema.get("type") {
        let ok = match expected {
            Value::String(t) => type_matches(data, t),
            Value::Array(ts) => ts
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(data, t)),
            _ => true,
        };
        if !ok {
            errors.push(format!(
                "{}: expected {}, got {}",
                display(path),
                expected,
                type_name(data)
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(data) {
            errors.push(format!("{}: value not in {:?}", display(path), allowed));
        }
    }

    if let (Some(map), Some(properties)) = (data.as_object(), schema.get("properties")) {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(key) {
                    errors.push(format!("{}: missing required '{}'", display(path), key));
                }
            }
        }
        if let Some(properties) = properties.as_object() {
            for (key, sub_schema) in properties {
                if let Some(sub_data) = map.get(key) {
                    let sub_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    check(sub_data, sub_schema, &sub_path, errors);
                }
            }
        }
    }

    if let (Some(items), Some(item_schema)) = (data.as_array(), schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item, item_schema, &format!("{}[{}]", path, i), errors);
        }
    }
}

fn type_matches(data: &Value, expected: &str) -> bool {
    match expected {
        "object" => data.is_object(),
        "array" => data.is_array(),
        "string" => data.is_string(),
        "integer" => data.is_i64() || data.is_u64(),
        "number" => data.is_number(),
        "boolean" => data.is_boolean(),
        "null" => data.is_null(),
        _ => true,
    }
}

fn type_name(data: &Value) -> &'static str {
    match data {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display(path: &str) -> &str {
    if path.is_empty() {
        "$"
    } else {
        path
    }
}
