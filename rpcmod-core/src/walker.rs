// Schema-guided recursive transform over response payloads
// Every built-in mod is a policy on top of this walker, and custom mods can
// use it directly through `deep_apply_mod` or `TreeWalker`.

use crate::schema::{FieldRef, SchemaNode};
use serde_json::{Map, Value};

/// A leaf reached by the walker: a value that is neither an object nor a sequence.
#[derive(Debug, Clone, Copy)]
pub struct Leaf<'a> {
    /// Key the leaf was found under. Elements of a sequence report the sequence's key.
    pub key: &'a str,
    pub value: &'a Value,
    /// Descriptor of the field, when the current schema node describes the key.
    pub field: Option<FieldRef<'a>>,
}

/// Decides which leaves get transformed.
pub enum Predicate<'p> {
    Const(bool),
    /// A function of `(key, value)`.
    Key(Box<dyn Fn(&str, &Value) -> bool + 'p>),
    /// A function of the leaf, including its field descriptor.
    Field(Box<dyn Fn(&Leaf<'_>) -> bool + 'p>),
}

impl<'p> Predicate<'p> {
    pub fn key(f: impl Fn(&str, &Value) -> bool + 'p) -> Self {
        Predicate::Key(Box::new(f))
    }

    pub fn field(f: impl Fn(&Leaf<'_>) -> bool + 'p) -> Self {
        Predicate::Field(Box::new(f))
    }

    pub fn matches(&self, leaf: &Leaf<'_>) -> bool {
        match self {
            Predicate::Const(b) => *b,
            Predicate::Key(f) => f(leaf.key, leaf.value),
            Predicate::Field(f) => f(leaf),
        }
    }
}

impl Default for Predicate<'_> {
    fn default() -> Self {
        Predicate::Const(true)
    }
}

impl From<bool> for Predicate<'_> {
    fn from(value: bool) -> Self {
        Predicate::Const(value)
    }
}

impl std::fmt::Debug for Predicate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Const(b) => f.debug_tuple("Const").field(b).finish(),
            Predicate::Key(_) => f.write_str("Key(<fn>)"),
            Predicate::Field(_) => f.write_str("Field(<fn>)"),
        }
    }
}

/// Leaf transform. Returning `None` omits the key from the enclosing object.
pub type Transform<'p> = dyn Fn(&Value) -> Option<Value> + 'p;

/// Recursively apply `transform` to every leaf of `value` matching `predicate`.
///
/// Objects are walked key by key; the child schema node is the nested type
/// of the key's field descriptor, or the current node when the key is not
/// described. Sequences are mapped element-wise, preserving order and length
/// (an omitted element keeps its original value). A top-level leaf has no key
/// to test and is returned unchanged. The input is never mutated.
pub fn deep_apply_mod(
    value: &Value,
    node: Option<SchemaNode<'_>>,
    transform: &Transform<'_>,
    predicate: &Predicate<'_>,
) -> Value {
    match value {
        Value::Object(map) => Value::Object(walk_object(map, node, transform, predicate)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| deep_apply_mod(item, node, transform, predicate))
                .collect(),
        ),
        leaf => leaf.clone(),
    }
}

fn walk_object(
    map: &Map<String, Value>,
    node: Option<SchemaNode<'_>>,
    transform: &Transform<'_>,
    predicate: &Predicate<'_>,
) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let field = node.and_then(|n| n.field(key));
        let context = match field {
            Some(field) => field.type_schema(),
            None => node,
        };
        if let Some(v) = walk_entry(key, value, field, context, transform, predicate) {
            out.insert(key.clone(), v);
        }
    }
    out
}

fn walk_entry(
    key: &str,
    value: &Value,
    field: Option<FieldRef<'_>>,
    context: Option<SchemaNode<'_>>,
    transform: &Transform<'_>,
    predicate: &Predicate<'_>,
) -> Option<Value> {
    match value {
        Value::Object(map) => Some(Value::Object(walk_object(map, context, transform, predicate))),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| {
                    walk_entry(key, item, field, context, transform, predicate)
                        .unwrap_or_else(|| item.clone())
                })
                .collect(),
        )),
        leaf => {
            let candidate = Leaf {
                key,
                value: leaf,
                field,
            };
            if predicate.matches(&candidate) {
                transform(leaf)
            } else {
                Some(leaf.clone())
            }
        }
    }
}

/// Builder over `deep_apply_mod` with identity transform and always-true predicate defaults.
pub struct TreeWalker<'p> {
    transform: Box<Transform<'p>>,
    predicate: Predicate<'p>,
}

impl<'p> TreeWalker<'p> {
    pub fn new() -> Self {
        Self {
            transform: Box::new(|v: &Value| Some(v.clone())),
            predicate: Predicate::default(),
        }
    }

    /// Replace matching leaves with the result of `f`.
    pub fn map(mut self, f: impl Fn(&Value) -> Value + 'p) -> Self {
        self.transform = Box::new(move |v: &Value| Some(f(v)));
        self
    }

    /// Full control over matching leaves; `None` omits the key.
    pub fn transform(mut self, f: impl Fn(&Value) -> Option<Value> + 'p) -> Self {
        self.transform = Box::new(f);
        self
    }

    pub fn when(mut self, predicate: impl Into<Predicate<'p>>) -> Self {
        self.predicate = predicate.into();
        self
    }

    pub fn when_key(self, f: impl Fn(&str, &Value) -> bool + 'p) -> Self {
        self.when(Predicate::key(f))
    }

    pub fn when_field(self, f: impl Fn(&Leaf<'_>) -> bool + 'p) -> Self {
        self.when(Predicate::field(f))
    }

    pub fn walk(&self, value: &Value, node: Option<SchemaNode<'_>>) -> Value {
        deep_apply_mod(value, node, self.transform.as_ref(), &self.predicate)
    }
}

impl Default for TreeWalker<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TreeWalker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWalker")
            .field("predicate", &self.predicate)
            .finish_non_exhaustive()
    }
}
