use serde_json::Value;
use std::path::PathBuf;

/// Errors raised while loading a schema document.
///
/// Building a registry from already-parsed definitions never fails; these only
/// surface at the file/JSON boundary.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("schema document is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Errors raised by a mod while transforming a payload.
///
/// Built-in mods never fail. User mods return these to reject a unary or
/// client-streaming call, or to terminate a response stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModError {
    /// A user mod rejected the payload.
    #[error("mod '{name}' failed: {message}")]
    Failed { name: String, message: String },

    /// The payload did not have the shape a mod expected.
    #[error("unexpected payload shape: expected {expected}, found {found}")]
    UnexpectedShape { expected: String, found: String },

    #[error("{0}")]
    Custom(String),
}

impl ModError {
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        ModError::Failed {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn unexpected_shape(expected: impl Into<String>, found: &Value) -> Self {
        ModError::UnexpectedShape {
            expected: expected.into(),
            found: value_kind(found).to_string(),
        }
    }

    pub fn custom(message: impl Into<String>) -> Self {
        ModError::Custom(message.into())
    }
}

/// Short name of a JSON value's kind, used in error messages and logs.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub type Result<T> = std::result::Result<T, ModError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mod_error_display() {
        let err = ModError::failed("addDuration", "created is missing");
        assert_eq!(err.to_string(), "mod 'addDuration' failed: created is missing");

        let err = ModError::unexpected_shape("object", &json!([1, 2]));
        assert_eq!(
            err.to_string(),
            "unexpected payload shape: expected object, found array"
        );

        let err = ModError::custom("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_schema_error_from_json() {
        let parse_err = serde_json::from_str::<Value>("{not json").unwrap_err();
        let err: SchemaError = parse_err.into();
        assert!(err.to_string().starts_with("schema document is not valid JSON"));
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(value_kind(&Value::Null), "null");
        assert_eq!(value_kind(&json!(true)), "bool");
        assert_eq!(value_kind(&json!(1)), "number");
        assert_eq!(value_kind(&json!("x")), "string");
        assert_eq!(value_kind(&json!([])), "array");
        assert_eq!(value_kind(&json!({})), "object");
    }
}
