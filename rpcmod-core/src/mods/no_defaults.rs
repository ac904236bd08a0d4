// Default nullification
// Rather than mutating transport-owned descriptors in place, this computes an
// overlay of field defaults. The engine applies it to its own registry and the
// transport boundary applies it to a per-binding copy of its decoder, both once
// at bind time.

use crate::schema::SchemaRegistry;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Location of a field: message type name plus field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    pub message: String,
    pub field: String,
}

impl FieldPath {
    pub fn new(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.message, self.field)
    }
}

/// Overridden field defaults, keyed by field path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultOverlay {
    entries: IndexMap<FieldPath, Value>,
}

impl DefaultOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: FieldPath, value: Value) -> Option<Value> {
        self.entries.insert(path, value)
    }

    pub fn get(&self, message: &str, field: &str) -> Option<&Value> {
        self.entries.get(&FieldPath::new(message, field))
    }

    pub fn contains(&self, path: &FieldPath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &Value)> {
        self.entries.iter()
    }

    /// Fold another overlay into this one; later entries win.
    pub fn merge(&mut self, other: DefaultOverlay) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Overlay that nullifies the singular field defaults of `type_name` and of
/// every message type reachable from it. Repeated fields keep their empty
/// sequence default. Returns `None` if the type is not in the registry.
pub fn overlay_for(registry: &SchemaRegistry, type_name: &str) -> Option<DefaultOverlay> {
    let root = registry.node(type_name)?;
    let mut overlay = DefaultOverlay::new();
    let mut visited = HashSet::new();
    let mut pending = vec![root];

    while let Some(node) = pending.pop() {
        if !visited.insert(node.name()) {
            continue;
        }
        for field in node.fields() {
            if let Some(nested) = field.type_schema() {
                pending.push(nested);
            }
            // repeated fields always decode to a sequence, empty when unset
            if !field.is_repeated() {
                overlay.insert(FieldPath::new(node.name(), field.name()), Value::Null);
            }
        }
    }

    Some(overlay)
}
