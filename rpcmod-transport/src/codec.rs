// Response decoder
// Shapes raw handler output the way a protobuf decoder would present it to
// the caller: unknown fields are dropped, absent fields are filled with their
// default, and 64-bit integers are handed over as strings.

use dashmap::DashMap;
use rpcmod_core::{DefaultOverlay, FieldPath, SchemaNode, SchemaRegistry};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::trace;

/// Decoder over a shared schema, owning its own default overrides.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    registry: Arc<SchemaRegistry>,
    overrides: DashMap<FieldPath, Value>,
}

impl ResponseDecoder {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            overrides: DashMap::new(),
        }
    }

    /// A new decoder over the same schema, with this decoder's overrides plus
    /// `overlay`. `self` is left untouched.
    pub fn with_overlay(&self, overlay: &DefaultOverlay) -> Self {
        let decoder = Self {
            registry: Arc::clone(&self.registry),
            overrides: self.overrides.clone(),
        };
        decoder.install_overlay(overlay);
        decoder
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Install default overrides. Later overlays replace earlier entries.
    pub fn install_overlay(&self, overlay: &DefaultOverlay) -> usize {
        for (path, value) in overlay.iter() {
            self.overrides.insert(path.clone(), value.clone());
        }
        trace!("Installed {} default overrides", overlay.len());
        overlay.len()
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    /// Decode a payload as `type_name`. Unknown types pass through untouched.
    pub fn decode(&self, value: Value, type_name: &str) -> Value {
        match self.registry.node(type_name) {
            Some(node) => self.decode_message(value, node),
            None => value,
        }
    }

    fn decode_message(&self, value: Value, node: SchemaNode<'_>) -> Value {
        let Value::Object(mut input) = value else {
            return value;
        };

        let mut out = Map::with_capacity(node.message().fields().count());
        for field in node.fields() {
            let decoded = match input.remove(field.name()) {
                Some(Value::Null) | None => {
                    self.default_for(node.name(), field.name(), field.default_value())
                }
                Some(raw) if field.is_repeated() => match raw {
                    Value::Array(items) => Value::Array(
                        items
                            .into_iter()
                            .map(|item| {
                                self.decode_single(item, field.type_schema(), field.is_int64())
                            })
                            .collect(),
                    ),
                    other => other,
                },
                Some(raw) => self.decode_single(raw, field.type_schema(), field.is_int64()),
            };
            out.insert(field.name().to_string(), decoded);
        }
        Value::Object(out)
    }

    fn decode_single(&self, value: Value, nested: Option<SchemaNode<'_>>, int64: bool) -> Value {
        if let Some(nested) = nested {
            return self.decode_message(value, nested);
        }
        match value {
            Value::Number(n) if int64 => Value::String(n.to_string()),
            other => other,
        }
    }

    fn default_for(&self, message: &str, field: &str, natural: &Value) -> Value {
        self.overrides
            .get(&FieldPath::new(message, field))
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| natural.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcmod_core::{overlay_for, FieldDefinition, MessageDefinition};
    use serde_json::json;

    fn decoder() -> ResponseDecoder {
        ResponseDecoder::new(SchemaRegistry::new(&[
            MessageDefinition::new(
                "Todo",
                vec![
                    FieldDefinition::new("id", "string"),
                    FieldDefinition::new("label", "string"),
                    FieldDefinition::new("created", "int64"),
                    FieldDefinition::new("completed", "int64"),
                    FieldDefinition::new("tags", "string").repeated(),
                    FieldDefinition::new("owner", "User"),
                ],
            ),
            MessageDefinition::new(
                "User",
                vec![
                    FieldDefinition::new("name", "string"),
                    FieldDefinition::new("karma", "uint64"),
                ],
            ),
        ]))
    }

    #[test]
    fn test_fills_defaults_and_drops_unknown() {
        let decoder = decoder();
        let out = decoder.decode(json!({ "id": "1", "created": 5, "secret": true }), "Todo");
        assert_eq!(
            out,
            json!({
                "id": "1",
                "label": "",
                "created": "5",
                "completed": "0",
                "tags": [],
                "owner": null
            })
        );
    }

    #[test]
    fn test_nested_messages_are_decoded() {
        let decoder = decoder();
        let out = decoder.decode(json!({ "owner": { "karma": 12 } }), "Todo");
        assert_eq!(out["owner"], json!({ "name": "", "karma": "12" }));
    }

    #[test]
    fn test_overlay_nullifies_defaults() {
        let decoder = decoder();
        let overlay = overlay_for(decoder.registry(), "Todo").unwrap();
        assert_eq!(decoder.install_overlay(&overlay), 7);

        let out = decoder.decode(json!({ "id": "3", "owner": {} }), "Todo");
        assert_eq!(out["completed"], Value::Null);
        assert_eq!(out["label"], Value::Null);
        assert_eq!(out["tags"], json!([]));
        assert_eq!(out["owner"], json!({ "name": null, "karma": null }));
    }

    #[test]
    fn test_with_overlay_leaves_original_untouched() {
        let base = decoder();
        let overlay = overlay_for(base.registry(), "Todo").unwrap();
        let bound = base.with_overlay(&overlay);

        assert_eq!(base.override_count(), 0);
        assert_eq!(bound.override_count(), 7);
        assert_eq!(base.decode(json!({}), "Todo")["completed"], json!("0"));
        assert_eq!(bound.decode(json!({}), "Todo")["completed"], Value::Null);
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let decoder = decoder();
        let raw = json!({ "anything": 1 });
        assert_eq!(decoder.decode(raw.clone(), "Nope"), raw);
        assert_eq!(decoder.decode(json!("scalar"), "Todo"), json!("scalar"));
    }
}
