// Schema registry for message types
// Turns the flat message/field list produced by an interface-description parser
// into a navigable type graph. Field descriptors never own their nested types;
// a nested type is looked up by name in the registry, so cyclic message graphs
// (A -> B -> A) need no special handling.

use crate::error::SchemaError;
use crate::mods::no_defaults::DefaultOverlay;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Protobuf scalar type tags that are encoded as strings on the wire.
pub const INT64_TYPES: [&str; 5] = ["int64", "uint64", "sint64", "fixed64", "sfixed64"];

const SCALAR_TYPES: [&str; 15] = [
    "double", "float", "int32", "int64", "uint32", "uint64", "sint32", "sint64", "fixed32",
    "fixed64", "sfixed32", "sfixed64", "bool", "string", "bytes",
];

/// Top-level schema document, as produced by the schema-description collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageDefinition>,
}

/// One message definition: a type name plus its ordered field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Nested message definitions (`message Outer { message Inner {} }`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<MessageDefinition>,
}

impl MessageDefinition {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            name: name.into(),
            fields,
            messages: Vec::new(),
        }
    }
}

/// Raw field definition as found in the schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub repeated: bool,
    /// Explicit name of the nested message type, when the parser resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_type: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            repeated: false,
            resolved_type: None,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }
}

/// A field of a message type.
///
/// Immutable once the registry is built, except for `default_value`, which
/// only a default overlay rewrites (at bind time).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    type_name: String,
    repeated: bool,
    resolved_type: Option<String>,
    default_value: Value,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    /// Registry name of the nested message type, `None` for scalars and enums.
    pub fn resolved_type(&self) -> Option<&str> {
        self.resolved_type.as_deref()
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub fn is_message(&self) -> bool {
        self.resolved_type.is_some()
    }

    /// True for the 64-bit integer family, which the transport hands over as strings.
    pub fn is_int64(&self) -> bool {
        INT64_TYPES.contains(&self.type_name.as_str())
    }
}

/// Natural zero value for a field, as a transport decoder would fill it in.
pub fn zero_value(type_name: &str, repeated: bool, is_message: bool) -> Value {
    if repeated {
        return Value::Array(Vec::new());
    }
    if is_message {
        return Value::Null;
    }
    match type_name {
        "string" | "bytes" => Value::String(String::new()),
        "bool" => Value::Bool(false),
        t if INT64_TYPES.contains(&t) => Value::String("0".to_string()),
        // 32-bit integers, floating point and enums
        _ => Value::from(0),
    }
}

/// Fields of one message type, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageType {
    name: String,
    fields: IndexMap<String, FieldDescriptor>,
}

impl MessageType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }
}

/// Registry of message types keyed by type name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaRegistry {
    messages: IndexMap<String, MessageType>,
    /// Short names of nested messages, pointing at their qualified entry.
    aliases: HashMap<String, String>,
}

impl SchemaRegistry {
    /// Build the registry from an ordered list of message definitions.
    ///
    /// Never fails: an empty list yields an empty registry, and field types
    /// that name no known message are treated as scalars/enums.
    pub fn new(definitions: &[MessageDefinition]) -> Self {
        let mut flat = Vec::new();
        for def in definitions {
            flatten_definition(def, None, &mut flat);
        }

        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut ambiguous = Vec::new();
        for (qualified, short, _) in &flat {
            if let Some(short) = short {
                if aliases.insert(short.clone(), qualified.clone()).is_some() {
                    ambiguous.push(short.clone());
                }
            }
        }
        for short in ambiguous {
            aliases.remove(&short);
        }

        let known: HashSet<&str> = flat.iter().map(|(q, _, _)| q.as_str()).collect();
        let resolve = |scope: &str, name: &str| -> Option<String> {
            if SCALAR_TYPES.contains(&name) {
                return None;
            }
            let scoped = format!("{scope}.{name}");
            if known.contains(scoped.as_str()) {
                return Some(scoped);
            }
            if known.contains(name) {
                return Some(name.to_string());
            }
            aliases.get(name).cloned()
        };

        let mut messages = IndexMap::with_capacity(flat.len());
        for (qualified, _, def) in &flat {
            let mut fields = IndexMap::with_capacity(def.fields.len());
            for field in &def.fields {
                let resolved_type = field
                    .resolved_type
                    .as_deref()
                    .and_then(|name| resolve(qualified, name))
                    .or_else(|| resolve(qualified, &field.type_name));
                let default_value =
                    zero_value(&field.type_name, field.repeated, resolved_type.is_some());
                fields.insert(
                    field.name.clone(),
                    FieldDescriptor {
                        name: field.name.clone(),
                        type_name: field.type_name.clone(),
                        repeated: field.repeated,
                        resolved_type,
                        default_value,
                    },
                );
            }

            if messages.contains_key(qualified) {
                warn!("Duplicate message definition '{}', keeping the last one", qualified);
            }
            messages.insert(
                qualified.clone(),
                MessageType {
                    name: qualified.clone(),
                    fields,
                },
            );
        }

        debug!("Built schema registry with {} message types", messages.len());
        Self { messages, aliases }
    }

    /// Parse a schema document from JSON.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let document: SchemaDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(&document))
    }

    pub fn from_document(document: &SchemaDocument) -> Self {
        Self::new(&document.messages)
    }

    /// Load a JSON schema document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Schema node for a message type, by qualified or unambiguous short name.
    pub fn node(&self, type_name: &str) -> Option<SchemaNode<'_>> {
        self.message(type_name).map(|message| SchemaNode {
            registry: self,
            message,
        })
    }

    pub fn message(&self, type_name: &str) -> Option<&MessageType> {
        self.messages.get(type_name).or_else(|| {
            self.aliases
                .get(type_name)
                .and_then(|qualified| self.messages.get(qualified))
        })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.message(type_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    /// Apply a default overlay to the registry's own field descriptors.
    ///
    /// Returns the number of descriptors rewritten. Paths naming unknown
    /// messages or fields are skipped.
    pub fn apply_overlay(&mut self, overlay: &DefaultOverlay) -> usize {
        let mut applied = 0;
        for (path, value) in overlay.iter() {
            let field = self
                .messages
                .get_mut(&path.message)
                .and_then(|message| message.fields.get_mut(&path.field));
            if let Some(field) = field {
                field.default_value = value.clone();
                applied += 1;
            }
        }
        applied
    }
}

fn flatten_definition<'d>(
    def: &'d MessageDefinition,
    parent: Option<&str>,
    out: &mut Vec<(String, Option<String>, &'d MessageDefinition)>,
) {
    let (qualified, short) = match parent {
        Some(parent) => (format!("{parent}.{}", def.name), Some(def.name.clone())),
        None => (def.name.clone(), None),
    };
    for nested in &def.messages {
        flatten_definition(nested, Some(&qualified), out);
    }
    out.push((qualified, short, def));
}

/// Borrowed view of one message type, used as traversal context.
///
/// Carries a reference to the whole registry so that fields can resolve
/// their nested types lazily.
#[derive(Debug, Clone, Copy)]
pub struct SchemaNode<'a> {
    registry: &'a SchemaRegistry,
    message: &'a MessageType,
}

impl<'a> SchemaNode<'a> {
    pub fn name(&self) -> &'a str {
        &self.message.name
    }

    pub fn message(&self) -> &'a MessageType {
        self.message
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    pub fn field(&self, key: &str) -> Option<FieldRef<'a>> {
        let message: &'a MessageType = self.message;
        message.fields.get(key).map(|descriptor| FieldRef {
            registry: self.registry,
            descriptor,
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldRef<'a>> + 'a {
        let registry = self.registry;
        let message: &'a MessageType = self.message;
        message.fields.values().map(move |descriptor| FieldRef {
            registry,
            descriptor,
        })
    }
}

impl PartialEq for SchemaNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.registry, other.registry) && self.message.name == other.message.name
    }
}

/// A field descriptor together with the registry it resolves types against.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    registry: &'a SchemaRegistry,
    descriptor: &'a FieldDescriptor,
}

impl<'a> FieldRef<'a> {
    pub fn descriptor(&self) -> &'a FieldDescriptor {
        self.descriptor
    }

    /// Schema node of this field's own nested type, `None` for scalars.
    pub fn type_schema(&self) -> Option<SchemaNode<'a>> {
        self.descriptor
            .resolved_type
            .as_deref()
            .and_then(|name| self.registry.node(name))
    }

    /// Schema node of an arbitrary named type.
    pub fn type_schema_of(&self, type_name: &str) -> Option<SchemaNode<'a>> {
        self.registry.node(type_name)
    }
}

impl std::ops::Deref for FieldRef<'_> {
    type Target = FieldDescriptor;

    fn deref(&self) -> &Self::Target {
        self.descriptor
    }
}
