// Schema-aware RPC client
// Binds a transport client once: classifies every method, applies the
// noDefaults overlay, and builds the mod pipeline. Calls then go through the
// adapter for the method's shape, and every inbound payload is transformed.

use crate::calls::{BidiStreamCall, ClientStreamCall, ModContext, ModStream};
use crate::dispatch::{BoundMethod, CallShape};
use crate::error::{CallError, ConfigError};
use indexmap::IndexMap;
use rpcmod_core::{
    overlay_for, DefaultOverlay, Mod, ModConfig, ModError, ModOptions, ModPipeline, SchemaNode,
    SchemaRegistry,
};
use rpcmod_transport::{Metadata, RpcClient};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for [`ModClient`].
#[derive(Default)]
pub struct ModClientBuilder {
    client: Option<Arc<dyn RpcClient>>,
    registry: Option<SchemaRegistry>,
    schema_path: Option<PathBuf>,
    config: ModConfig,
}

impl ModClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(self, client: impl RpcClient + 'static) -> Self {
        self.shared_client(Arc::new(client))
    }

    pub fn shared_client(mut self, client: Arc<dyn RpcClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn schema(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Load the schema from a JSON schema document when building.
    ///
    /// Ignored when a registry was also given with [`schema`](Self::schema).
    pub fn schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    pub fn config(mut self, config: ModConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the option flags, keeping any mods already added.
    pub fn options(mut self, options: ModOptions) -> Self {
        self.config.options = options;
        self
    }

    pub fn with_mod<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, Option<SchemaNode<'_>>) -> Result<Value, ModError> + Send + Sync + 'static,
    {
        self.config = self.config.with_mod(f);
        self
    }

    pub fn with_mods(mut self, mods: impl IntoIterator<Item = Arc<dyn Mod>>) -> Self {
        self.config = self.config.with_mods(mods);
        self
    }

    pub fn build(self) -> Result<ModClient, ConfigError> {
        let client = self.client.ok_or(ConfigError::NoClient)?;
        let mut registry = match (self.registry, self.schema_path) {
            (Some(registry), _) => Some(registry),
            (None, Some(path)) => Some(SchemaRegistry::from_path(&path)?),
            (None, None) => None,
        };
        let options = self.config.options;

        if options.enforce_number && registry.is_none() {
            return Err(ConfigError::EnforceNumberWithoutSchema);
        }

        let mut methods = IndexMap::new();
        let mut overlay = DefaultOverlay::new();
        for descriptor in client.methods() {
            let method = BoundMethod::new(descriptor);

            if options.no_defaults {
                if let Some(registry) = registry.as_ref().filter(|r| !r.is_empty()) {
                    let method_overlay = overlay_for(registry, method.response_type()).ok_or_else(
                        || ConfigError::UnresolvedResponseType {
                            method: method.name().to_string(),
                            type_name: method.response_type().to_string(),
                        },
                    )?;
                    overlay.merge(method_overlay);
                }
            }

            debug!(
                "Bound method '{}' as {} returning '{}'",
                method.name(),
                method.shape(),
                method.response_type()
            );
            methods.insert(method.name().to_string(), method);
        }

        let client = if overlay.is_empty() {
            client
        } else {
            if let Some(registry) = registry.as_mut() {
                registry.apply_overlay(&overlay);
            }
            debug!("Binding with a default overlay of {} fields", overlay.len());
            client.with_default_overlay(&overlay)
        };

        let pipeline = ModPipeline::new(&self.config);
        info!(
            "Bound '{}': {} methods, {} schema types, pipeline {:?}",
            client.service_name(),
            methods.len(),
            registry.as_ref().map_or(0, SchemaRegistry::len),
            pipeline
        );

        Ok(ModClient {
            client,
            context: ModContext::new(registry.map(Arc::new), Arc::new(pipeline)),
            methods,
            options,
        })
    }
}

impl std::fmt::Debug for ModClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModClientBuilder")
            .field("client", &self.client.as_ref().map(|c| c.service_name()))
            .field("schema_path", &self.schema_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// An RPC client whose responses pass through the mod pipeline.
#[derive(Clone)]
pub struct ModClient {
    client: Arc<dyn RpcClient>,
    context: ModContext,
    methods: IndexMap<String, BoundMethod>,
    options: ModOptions,
}

impl ModClient {
    pub fn builder() -> ModClientBuilder {
        ModClientBuilder::new()
    }

    pub fn service_name(&self) -> &str {
        self.client.service_name()
    }

    pub fn methods(&self) -> impl Iterator<Item = &BoundMethod> {
        self.methods.values()
    }

    pub fn method(&self, name: &str) -> Option<&BoundMethod> {
        self.methods.get(name)
    }

    pub fn shape_of(&self, name: &str) -> Option<CallShape> {
        self.method(name).map(BoundMethod::shape)
    }

    pub fn schema(&self) -> Option<&SchemaRegistry> {
        self.context.registry()
    }

    pub fn options(&self) -> ModOptions {
        self.options
    }

    pub fn pipeline(&self) -> &ModPipeline {
        self.context.pipeline()
    }

    fn resolve(&self, name: &str, expected: CallShape) -> Result<&BoundMethod, CallError> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| CallError::UnknownMethod(name.to_string()))?;
        if method.shape() != expected {
            return Err(CallError::ShapeMismatch {
                method: name.to_string(),
                expected,
                actual: method.shape(),
            });
        }
        Ok(method)
    }

    pub async fn unary(&self, name: &str, request: Value) -> Result<Value, CallError> {
        self.unary_with_metadata(name, request, Metadata::new()).await
    }

    pub async fn unary_with_metadata(
        &self,
        name: &str,
        request: Value,
        metadata: Metadata,
    ) -> Result<Value, CallError> {
        let method = self.resolve(name, CallShape::Unary)?;
        debug!("Calling '{}'", name);
        let response = self.client.unary(name, request, metadata).await?;
        self.context.transform(response, method.response_type())
    }

    pub fn client_stream(&self, name: &str) -> Result<ClientStreamCall, CallError> {
        self.client_stream_with_metadata(name, Metadata::new())
    }

    pub fn client_stream_with_metadata(
        &self,
        name: &str,
        metadata: Metadata,
    ) -> Result<ClientStreamCall, CallError> {
        let method = self.resolve(name, CallShape::ClientStreaming)?;
        debug!("Opening client stream '{}'", name);
        let (handle, completion) = self.client.client_stream(name, metadata);
        Ok(ClientStreamCall::new(
            handle,
            completion,
            self.context.clone(),
            method.response_type(),
        ))
    }

    pub fn server_stream(&self, name: &str, request: Value) -> Result<ModStream, CallError> {
        self.server_stream_with_metadata(name, request, Metadata::new())
    }

    pub fn server_stream_with_metadata(
        &self,
        name: &str,
        request: Value,
        metadata: Metadata,
    ) -> Result<ModStream, CallError> {
        let method = self.resolve(name, CallShape::ServerStreaming)?;
        debug!("Opening server stream '{}'", name);
        let events = self.client.server_stream(name, request, metadata);
        Ok(ModStream::new(
            events,
            self.context.clone(),
            method.response_type(),
        ))
    }

    pub fn bidi_stream(&self, name: &str) -> Result<BidiStreamCall, CallError> {
        self.bidi_stream_with_metadata(name, Metadata::new())
    }

    pub fn bidi_stream_with_metadata(
        &self,
        name: &str,
        metadata: Metadata,
    ) -> Result<BidiStreamCall, CallError> {
        let method = self.resolve(name, CallShape::Bidirectional)?;
        debug!("Opening bidirectional stream '{}'", name);
        let (handle, events) = self.client.bidi_stream(name, metadata);
        let messages = ModStream::new(events, self.context.clone(), method.response_type());
        Ok(BidiStreamCall::new(handle, messages))
    }
}

impl std::fmt::Debug for ModClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModClient")
            .field("service", &self.client.service_name())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
