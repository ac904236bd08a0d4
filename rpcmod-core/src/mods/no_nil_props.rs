use crate::schema::SchemaNode;
use crate::walker::{deep_apply_mod, Predicate};
use serde_json::Value;

/// Remove every key whose value is null, at any depth.
///
/// Pruning is bottom-up: an object emptied by pruning stays behind as `{}`
/// under its key. Nulls inside sequences are kept so lengths are preserved.
pub fn no_nil_props(value: &Value, node: Option<SchemaNode<'_>>) -> Value {
    let predicate = Predicate::key(|_, v| v.is_null());
    deep_apply_mod(value, node, &|_: &Value| -> Option<Value> { None }, &predicate)
}
