//! Built-in mods.
//!
//! `enforce_number` and `no_nil_props` run on every inbound payload;
//! `no_defaults` is a bind-time policy that produces a default overlay.

pub mod enforce_number;
pub mod no_defaults;
pub mod no_nil_props;

pub use enforce_number::{coerce_int64, enforce_number};
pub use no_defaults::{overlay_for, DefaultOverlay, FieldPath};
pub use no_nil_props::no_nil_props;

use crate::schema::SchemaNode;
use serde_json::Value;

/// Built-in payload mods, listed in the order the pipeline runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinMod {
    EnforceNumber,
    NoNilProps,
}

impl BuiltinMod {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinMod::EnforceNumber => "enforceNumber",
            BuiltinMod::NoNilProps => "noNilProps",
        }
    }

    pub fn apply(&self, value: &Value, node: Option<SchemaNode<'_>>) -> Value {
        match self {
            BuiltinMod::EnforceNumber => enforce_number(value, node),
            BuiltinMod::NoNilProps => no_nil_props(value, node),
        }
    }
}

impl std::fmt::Display for BuiltinMod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
