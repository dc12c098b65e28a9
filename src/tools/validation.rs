//! Argument checks run before a tool executes.

use serde_json::Value;

use crate::error::{ColloquyError, Result};

/// Check model-proposed arguments against a tool's declared schema.
///
/// Only the top level is checked: object shape, required fields, declared
/// property types and string enums. The first violation wins.
pub fn validate_arguments(tool_name: &str, args: &Value, schema: &Value) -> Result<()> {
    let fail = |message: String| ColloquyError::ToolArgument {
        tool_name: tool_name.to_string(),
        message,
    };

    let expects_object = schema.get("type").and_then(Value::as_str) == Some("object");
    let obj = match args.as_object() {
        Some(obj) => obj,
        None if expects_object => {
            return Err(fail(format!(
                "expected object arguments, got {}",
                json_type_name(args)
            )));
        }
        None => return Ok(()),
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        if let Some(name) = required
            .iter()
            .filter_map(Value::as_str)
            .find(|name| !obj.contains_key(*name))
        {
            return Err(fail(format!("missing required field '{name}'")));
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in obj {
        let Some(prop) = properties.get(key) else {
            continue;
        };
        if let Some(expected) = prop.get("type").and_then(Value::as_str) {
            if !value_matches_type(value, expected) {
                return Err(fail(format!(
                    "field '{key}' expected type '{expected}', got {}",
                    json_type_name(value)
                )));
            }
        }
        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(fail(format!("field '{key}' must be one of {}", Value::from(allowed.clone()))));
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        // Models often send 3.0 for an integer field.
        "integer" => value.as_f64().is_some_and(|n| n.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
