use crate::dispatch::CallShape;
use rpcmod_core::{ModError, SchemaError};
use rpcmod_transport::{Status, TransportError};
use thiserror::Error;

/// Errors raised while binding a client.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No client provided")]
    NoClient,

    #[error("You can't activate 'enforceNumber' without providing a schema")]
    EnforceNumberWithoutSchema,

    #[error("Response type '{type_name}' of method '{method}' is not in the schema")]
    UnresolvedResponseType { method: String, type_name: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Errors surfaced by a call.
///
/// Transport failures are carried unmodified; mod failures reject deferred
/// calls and terminate streams.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] Status),

    #[error(transparent)]
    Mod(#[from] ModError),

    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("Method '{method}' is {actual}, not {expected}")]
    ShapeMismatch {
        method: String,
        expected: CallShape,
        actual: CallShape,
    },
}

impl CallError {
    /// The transport status, when the call failed at the transport.
    pub fn status(&self) -> Option<&Status> {
        match self {
            CallError::Transport(status) => Some(status),
            _ => None,
        }
    }
}

impl From<TransportError> for CallError {
    fn from(err: TransportError) -> Self {
        CallError::Transport(err.into())
    }
}

pub type Result<T> = std::result::Result<T, CallError>;
