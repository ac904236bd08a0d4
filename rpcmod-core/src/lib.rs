//! Schema model, tree walker and response mod pipeline.
//!
//! The transport and client crates build on these pieces: the registry is
//! built once per client, and every inbound payload goes through
//! [`ModPipeline::apply_mods`] with the schema node of its response type.

pub mod error;
pub mod mods;
pub mod options;
pub mod pipeline;
pub mod schema;
pub mod walker;

pub use error::{value_kind, ModError, SchemaError};
pub use mods::{
    coerce_int64, enforce_number, no_nil_props, overlay_for, BuiltinMod, DefaultOverlay,
    FieldPath,
};
pub use options::{ModConfig, ModOptions};
pub use pipeline::{schema_first, FnMod, Mod, ModPipeline};
pub use schema::{
    zero_value, FieldDefinition, FieldDescriptor, FieldRef, MessageDefinition, MessageType,
    SchemaDocument, SchemaNode, SchemaRegistry, INT64_TYPES,
};
pub use walker::{deep_apply_mod, Leaf, Predicate, Transform, TreeWalker};

// Re-exported so callers can build payloads without a direct dependency.
pub use serde_json::{json, Value};
