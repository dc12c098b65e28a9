//! Typed access to a tool call's arguments.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ColloquyError, Result};

/// Arguments a model proposed for one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    tool_name: String,
    raw: Value,
}

impl ToolArguments {
    pub fn new(tool_name: impl Into<String>, raw: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            raw,
        }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    fn error(&self, message: String) -> ColloquyError {
        ColloquyError::ToolArgument {
            tool_name: self.tool_name.clone(),
            message,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| self.error(format!("'{key}' must be a string")))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.error(format!("'{key}' must be a number")))
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.get(key)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().filter(|n| n.fract() == 0.0).map(|n| n as i64)))
            .ok_or_else(|| self.error(format!("'{key}' must be an integer")))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.error(format!("'{key}' must be a boolean")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Deserialize the whole argument object into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.raw.clone()).map_err(|e| self.error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn typed_getters() {
        let args = ToolArguments::new("t", json!({ "s": "x", "n": 2.5, "i": 4.0, "b": true }));

        assert_eq!(args.get_str("s").unwrap(), "x");
        assert_eq!(args.get_f64("n").unwrap(), 2.5);
        assert_eq!(args.get_i64("i").unwrap(), 4);
        assert!(args.get_bool("b").unwrap());
        assert_eq!(args.get_str_opt("missing"), None);
    }

    #[test]
    fn wrong_type_is_argument_error() {
        let args = ToolArguments::new("t", json!({ "n": "two" }));

        let err = args.get_f64("n").unwrap_err();
        assert!(matches!(err, ColloquyError::ToolArgument { ref tool_name, .. } if tool_name == "t"));
    }

    #[test]
    fn parse_into_struct() {
        #[derive(Deserialize)]
        struct Query {
            city: String,
        }
        let args = ToolArguments::new("t", json!({ "city": "Oslo" }));

        let query: Query = args.parse().unwrap();
        assert_eq!(query.city, "Oslo");
    }
}
