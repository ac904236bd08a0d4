// Mod pipeline
// Composes built-in and user mods into one ordered transform. Built-ins run
// first (enforceNumber, then noNilProps) so user mods always see coerced
// numbers; user mods follow in the order they were configured.

use crate::error::ModError;
use crate::mods::BuiltinMod;
use crate::options::ModConfig;
use crate::schema::SchemaNode;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// A payload transform bound to the payload's schema node.
pub trait Mod: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        "anonymous"
    }

    fn apply(&self, payload: Value, context: Option<SchemaNode<'_>>) -> Result<Value, ModError>;
}

type ModFn = dyn Fn(Value, Option<SchemaNode<'_>>) -> Result<Value, ModError> + Send + Sync;

/// A closure or function adapted to [`Mod`].
pub struct FnMod {
    name: String,
    f: Box<ModFn>,
}

impl FnMod {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, Option<SchemaNode<'_>>) -> Result<Value, ModError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl Mod for FnMod {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, payload: Value, context: Option<SchemaNode<'_>>) -> Result<Value, ModError> {
        (self.f)(payload, context)
    }
}

impl std::fmt::Debug for FnMod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMod").field("name", &self.name).finish()
    }
}

/// Adapt a mod written as `(schema, payload)` to the `(payload, schema)` contract.
pub fn schema_first<F>(
    f: F,
) -> impl Fn(Value, Option<SchemaNode<'_>>) -> Result<Value, ModError> + Send + Sync + 'static
where
    F: Fn(Option<SchemaNode<'_>>, Value) -> Result<Value, ModError> + Send + Sync + 'static,
{
    move |payload: Value, context: Option<SchemaNode<'_>>| f(context, payload)
}

/// The composed transform applied to every inbound payload.
#[derive(Clone, Default)]
pub struct ModPipeline {
    builtins: Vec<BuiltinMod>,
    user_mods: Vec<Arc<dyn Mod>>,
}

impl ModPipeline {
    pub fn new(config: &ModConfig) -> Self {
        let mut builtins = Vec::new();
        if config.options.enforce_number {
            builtins.push(BuiltinMod::EnforceNumber);
        }
        if config.options.no_nil_props {
            builtins.push(BuiltinMod::NoNilProps);
        }
        Self {
            builtins,
            user_mods: config.mods.clone(),
        }
    }

    pub fn builtins(&self) -> &[BuiltinMod] {
        &self.builtins
    }

    pub fn user_mod_count(&self) -> usize {
        self.user_mods.len()
    }

    /// True when no mod is configured and payloads pass through untouched.
    pub fn is_identity(&self) -> bool {
        self.builtins.is_empty() && self.user_mods.is_empty()
    }

    /// Run every mod over a single payload.
    pub fn apply(&self, payload: Value, context: Option<SchemaNode<'_>>) -> Result<Value, ModError> {
        let mut payload = payload;
        for builtin in &self.builtins {
            payload = builtin.apply(&payload, context);
        }
        for m in &self.user_mods {
            trace!(mod_name = m.name(), "Applying user mod");
            payload = m.apply(payload, context)?;
        }
        Ok(payload)
    }

    /// Apply the pipeline to inbound data.
    ///
    /// Sequences are transformed element by element; `null` passes through
    /// without running any mod.
    pub fn apply_mods(
        &self,
        data: Value,
        context: Option<SchemaNode<'_>>,
    ) -> Result<Value, ModError> {
        match data {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => items
                .into_iter()
                .map(|doc| self.apply(doc, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            doc => self.apply(doc, context),
        }
    }
}

impl std::fmt::Debug for ModPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.user_mods.iter().map(|m| m.name()).collect();
        f.debug_struct("ModPipeline")
            .field("builtins", &self.builtins)
            .field("user_mods", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ModOptions;
    use crate::schema::{FieldDefinition, MessageDefinition, SchemaRegistry};
    use serde_json::json;
    use std::sync::Mutex;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(&[MessageDefinition::new(
            "Todo",
            vec![
                FieldDefinition::new("id", "string"),
                FieldDefinition::new("created", "int64"),
                FieldDefinition::new("completed", "int64"),
            ],
        )])
    }

    #[test]
    fn test_builtin_order_is_fixed() {
        let config = ModConfig::new(ModOptions {
            no_defaults: true,
            enforce_number: true,
            no_nil_props: true,
        });
        let pipeline = ModPipeline::new(&config);
        assert_eq!(
            pipeline.builtins(),
            &[BuiltinMod::EnforceNumber, BuiltinMod::NoNilProps]
        );
    }

    #[test]
    fn test_user_mods_see_coerced_numbers() {
        let registry = registry();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let config = ModConfig::default()
            .enforce_number(true)
            .no_nil_props(true)
            .with_mod(move |payload, _| {
                seen_clone.lock().unwrap().push(payload.clone());
                Ok(payload)
            });
        let pipeline = ModPipeline::new(&config);

        let out = pipeline
            .apply(
                json!({ "id": "1", "created": "100", "completed": null }),
                registry.node("Todo"),
            )
            .unwrap();

        assert_eq!(out, json!({ "id": "1", "created": 100 }));
        assert_eq!(seen.lock().unwrap()[0], json!({ "id": "1", "created": 100 }));
    }

    #[test]
    fn test_user_mods_run_in_order() {
        let config = ModConfig::default()
            .with_mod(|mut payload, _| {
                payload["trail"] = json!("a");
                Ok(payload)
            })
            .with_mod(|mut payload, _| {
                let prev = payload["trail"].as_str().unwrap_or_default().to_string();
                payload["trail"] = json!(format!("{prev}b"));
                Ok(payload)
            });
        let pipeline = ModPipeline::new(&config);

        let out = pipeline.apply(json!({}), None).unwrap();
        assert_eq!(out, json!({ "trail": "ab" }));
    }

    #[test]
    fn test_user_mod_receives_context() {
        let registry = registry();
        let config = ModConfig::default().with_mod(|mut payload, context| {
            payload["context"] = json!(context.map(|node| node.name()));
            Ok(payload)
        });
        let pipeline = ModPipeline::new(&config);

        let out = pipeline.apply(json!({}), registry.node("Todo")).unwrap();
        assert_eq!(out, json!({ "context": "Todo" }));
    }

    #[test]
    fn test_schema_first_adapter() {
        let registry = registry();
        let config = ModConfig::default().with_mod(schema_first(|context, mut payload| {
            payload["fields"] = json!(context.map(|node| node.fields().count()));
            Ok(payload)
        }));
        let pipeline = ModPipeline::new(&config);

        let out = pipeline.apply(json!({}), registry.node("Todo")).unwrap();
        assert_eq!(out, json!({ "fields": 3 }));
    }

    #[test]
    fn test_apply_mods_sequences_and_null() {
        let registry = registry();
        let pipeline = ModPipeline::new(&ModConfig::default().enforce_number(true));

        let out = pipeline
            .apply_mods(json!([{ "created": "1" }, { "created": "2" }]), registry.node("Todo"))
            .unwrap();
        assert_eq!(out, json!([{ "created": 1 }, { "created": 2 }]));

        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let counting = ModPipeline::new(&ModConfig::default().with_mod(move |v, _| {
            *calls_clone.lock().unwrap() += 1;
            Ok(v)
        }));
        assert_eq!(counting.apply_mods(Value::Null, None).unwrap(), Value::Null);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_mod_errors_propagate() {
        let pipeline = ModPipeline::new(
            &ModConfig::default()
                .with_named_mod("reject", |_, _| Err(ModError::failed("reject", "nope")))
                .with_mod(|_, _| Ok(json!("unreachable"))),
        );

        let err = pipeline.apply_mods(json!([{}, {}]), None).unwrap_err();
        assert_eq!(err, ModError::failed("reject", "nope"));
    }

    #[test]
    fn test_identity_pipeline() {
        let pipeline = ModPipeline::new(&ModConfig::default());
        assert!(pipeline.is_identity());
        let doc = json!({ "created": "1", "x": null });
        assert_eq!(pipeline.apply_mods(doc.clone(), None).unwrap(), doc);
    }
}
