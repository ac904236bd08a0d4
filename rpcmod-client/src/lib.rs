//! Schema-aware RPC client with response mods.
//!
//! [`ModClient`] wraps any [`RpcClient`](rpcmod_transport::RpcClient) and
//! exposes one adapter per call shape. Inbound payloads go through the
//! configured [`ModPipeline`](rpcmod_core::ModPipeline) before the caller
//! sees them.

pub mod calls;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod logging;

pub use calls::{BidiStreamCall, ClientStreamCall, ModStream, SharedResponse};
pub use client::{ModClient, ModClientBuilder};
pub use dispatch::{BoundMethod, CallShape};
pub use error::{CallError, ConfigError};
pub use logging::{init_logging, init_test_logging, LogFormat};

pub use rpcmod_core::{
    deep_apply_mod, schema_first, Mod, ModConfig, ModError, ModOptions, Predicate, SchemaNode,
    SchemaRegistry, TreeWalker,
};
pub use rpcmod_transport::{Metadata, Status};
