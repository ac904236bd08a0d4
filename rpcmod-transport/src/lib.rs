pub mod codec;
pub mod memory;
pub mod metadata;
pub mod status;
pub mod transport;

pub use codec::ResponseDecoder;
pub use memory::{MemoryClient, MemoryService, ResponseSink};
pub use metadata::Metadata;
pub use status::{Code, Status, TransportError};
pub use transport::{
    CallHandle, Completion, EventStream, MethodDescriptor, RequestStream, RpcClient, StreamEvent,
};
