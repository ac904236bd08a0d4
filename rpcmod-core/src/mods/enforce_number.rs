use crate::schema::SchemaNode;
use crate::walker::{deep_apply_mod, Predicate};
use serde_json::Value;
use tracing::warn;

/// Turn stringified 64-bit integer fields into JSON numbers.
///
/// Only leaves whose field descriptor resolves to a 64-bit integer type are
/// touched; anything the schema does not describe passes through as-is.
pub fn enforce_number(value: &Value, node: Option<SchemaNode<'_>>) -> Value {
    let predicate = Predicate::field(|leaf| leaf.field.is_some_and(|f| f.is_int64()));
    deep_apply_mod(value, node, &|v: &Value| Some(coerce_int64(v)), &predicate)
}

/// Parse a transport-encoded 64-bit integer. Unparsable values are returned unchanged.
pub fn coerce_int64(value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    let trimmed = s.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = trimmed.parse::<u64>() {
        return Value::from(n);
    }
    warn!("Leaving unparsable int64 value {:?} as a string", s);
    value.clone()
}
