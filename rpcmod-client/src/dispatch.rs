use rpcmod_transport::MethodDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request/response directionality of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Bidirectional,
}

impl CallShape {
    pub fn classify(method: &MethodDescriptor) -> Self {
        match (method.request_stream, method.response_stream) {
            (false, false) => CallShape::Unary,
            (true, false) => CallShape::ClientStreaming,
            (false, true) => CallShape::ServerStreaming,
            (true, true) => CallShape::Bidirectional,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallShape::Unary => "unary",
            CallShape::ClientStreaming => "client streaming",
            CallShape::ServerStreaming => "server streaming",
            CallShape::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport method together with its classified shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundMethod {
    descriptor: MethodDescriptor,
    shape: CallShape,
}

impl BoundMethod {
    pub fn new(descriptor: MethodDescriptor) -> Self {
        let shape = CallShape::classify(&descriptor);
        Self { descriptor, shape }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn shape(&self) -> CallShape {
        self.shape
    }

    pub fn response_type(&self) -> &str {
        &self.descriptor.response_type
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }
}
