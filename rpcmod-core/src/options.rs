use crate::pipeline::{FnMod, Mod};
use crate::schema::SchemaNode;
use crate::ModError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Flags recognised by the mod engine.
///
/// Deserialises from the camelCase option names (`noDefaults`,
/// `enforceNumber`, `noNilProps`); absent keys are `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModOptions {
    /// Decode unset response fields as `null` instead of their zero value.
    pub no_defaults: bool,
    /// Turn stringified 64-bit integers into numbers. Requires a schema.
    pub enforce_number: bool,
    /// Drop keys whose value is `null`.
    pub no_nil_props: bool,
}

impl ModOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Options plus the ordered list of user mods.
#[derive(Clone, Default)]
pub struct ModConfig {
    pub options: ModOptions,
    pub mods: Vec<Arc<dyn Mod>>,
}

impl ModConfig {
    pub fn new(options: ModOptions) -> Self {
        Self {
            options,
            mods: Vec::new(),
        }
    }

    pub fn no_defaults(mut self, enabled: bool) -> Self {
        self.options.no_defaults = enabled;
        self
    }

    pub fn enforce_number(mut self, enabled: bool) -> Self {
        self.options.enforce_number = enabled;
        self
    }

    pub fn no_nil_props(mut self, enabled: bool) -> Self {
        self.options.no_nil_props = enabled;
        self
    }

    /// Append a user mod. Mods run in the order they are added.
    pub fn with_mod<F>(self, f: F) -> Self
    where
        F: Fn(Value, Option<SchemaNode<'_>>) -> Result<Value, ModError> + Send + Sync + 'static,
    {
        self.with_named_mod("anonymous", f)
    }

    pub fn with_named_mod<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, Option<SchemaNode<'_>>) -> Result<Value, ModError> + Send + Sync + 'static,
    {
        self.mods.push(Arc::new(FnMod::new(name, f)));
        self
    }

    /// Append an already-built mod, e.g. a struct implementing [`Mod`].
    pub fn with_mod_impl(mut self, m: Arc<dyn Mod>) -> Self {
        self.mods.push(m);
        self
    }

    pub fn with_mods(mut self, mods: impl IntoIterator<Item = Arc<dyn Mod>>) -> Self {
        self.mods.extend(mods);
        self
    }
}

impl From<ModOptions> for ModConfig {
    fn from(options: ModOptions) -> Self {
        Self::new(options)
    }
}

impl std::fmt::Debug for ModConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.mods.iter().map(|m| m.name()).collect();
        f.debug_struct("ModConfig")
            .field("options", &self.options)
            .field("mods", &names)
            .finish()
    }
}
