use crate::metadata::Metadata;
use crate::status::{Status, TransportError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use rpcmod_core::DefaultOverlay;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Description of one RPC method, owned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    pub name: String,
    pub request_stream: bool,
    pub response_stream: bool,
    pub request_type: String,
    pub response_type: String,
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        request_type: impl Into<String>,
        response_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            request_stream: false,
            response_stream: false,
            request_type: request_type.into(),
            response_type: response_type.into(),
        }
    }

    pub fn request_stream(mut self, enabled: bool) -> Self {
        self.request_stream = enabled;
        self
    }

    pub fn response_stream(mut self, enabled: bool) -> Self {
        self.response_stream = enabled;
        self
    }
}

/// One event on an inbound message stream.
///
/// A stream carries zero or more `Data` events followed by exactly one
/// terminal event (`Error` or `End`).
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Data(Value),
    Error(Status),
    End,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Data(_))
    }
}

/// Inbound messages of a server-streaming or bidirectional call.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Deferred result of a client-streaming call.
pub type Completion = BoxFuture<'static, Result<Value, Status>>;

/// Outbound messages as seen by the serving side of a call.
pub type RequestStream = BoxStream<'static, Value>;

#[derive(Debug)]
enum Outbound {
    Write(Value),
    End,
}

/// Write side of a client-streaming or bidirectional call.
///
/// Cloning yields another handle to the same call.
#[derive(Debug, Clone)]
pub struct CallHandle {
    tx: mpsc::UnboundedSender<Outbound>,
    ended: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl CallHandle {
    /// Create a handle and the request stream its writes feed.
    ///
    /// The stream finishes on `end()`, on cancellation, or once every handle
    /// has been dropped.
    pub fn channel() -> (Self, RequestStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = Self {
            tx,
            ended: Arc::new(AtomicBool::new(false)),
            cancel: cancel.clone(),
        };

        let requests = stream::unfold((rx, cancel), |(mut rx, cancel)| async move {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                msg = rx.recv() => msg,
            };
            match next {
                Some(Outbound::Write(value)) => Some((value, (rx, cancel))),
                Some(Outbound::End) | None => None,
            }
        });

        (handle, Box::pin(requests))
    }

    pub fn write(&self, message: Value) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        if self.ended.load(Ordering::Acquire) {
            return Err(TransportError::StreamEnded);
        }
        self.tx
            .send(Outbound::Write(message))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Half-close the request stream. Ending twice is a no-op.
    pub fn end(&self) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        if self.ended.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.tx
            .send(Outbound::End)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Cancel the call. The call then terminates with a `Cancelled` status.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by the serving side to stop work on cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Boundary between the mod engine and a concrete RPC client.
///
/// Implementations own connection management and wire encoding. Call
/// failures, including unknown methods, are reported as a [`Status`]
/// through the call's own result or stream.
#[async_trait]
pub trait RpcClient: Send + Sync {
    fn service_name(&self) -> &str;

    /// Every method the service exposes.
    fn methods(&self) -> Vec<MethodDescriptor>;

    /// A client for the same service whose response decoder uses `overlay`
    /// for field defaults.
    ///
    /// Called once per binding, before any call is made. `self` and any
    /// other client sharing its connection keep their defaults.
    fn with_default_overlay(&self, overlay: &DefaultOverlay) -> Arc<dyn RpcClient>;

    async fn unary(&self, method: &str, request: Value, metadata: Metadata)
        -> Result<Value, Status>;

    fn client_stream(&self, method: &str, metadata: Metadata) -> (CallHandle, Completion);

    fn server_stream(&self, method: &str, request: Value, metadata: Metadata) -> EventStream;

    fn bidi_stream(&self, method: &str, metadata: Metadata) -> (CallHandle, EventStream);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_handle_feeds_request_stream() {
        let (handle, requests) = CallHandle::channel();
        handle.write(json!(1)).unwrap();
        handle.write(json!(2)).unwrap();
        handle.end().unwrap();

        let received: Vec<Value> = requests.collect().await;
        assert_eq!(received, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_write_after_end_fails() {
        let (handle, _requests) = CallHandle::channel();
        handle.end().unwrap();
        handle.end().unwrap();
        assert_eq!(handle.write(json!(1)), Err(TransportError::StreamEnded));
    }

    #[tokio::test]
    async fn test_cancel_closes_request_stream() {
        let (handle, mut requests) = CallHandle::channel();
        handle.write(json!("a")).unwrap();
        handle.cancel();

        assert!(requests.next().await.is_none());
        assert!(handle.is_cancelled());
        assert_eq!(handle.write(json!("b")), Err(TransportError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_handles_close_request_stream() {
        let (handle, requests) = CallHandle::channel();
        let clone = handle.clone();
        clone.write(json!(1)).unwrap();
        drop(handle);
        drop(clone);

        let received: Vec<Value> = requests.collect().await;
        assert_eq!(received, vec![json!(1)]);
    }

    #[test]
    fn test_method_descriptor_serde() {
        let method = MethodDescriptor::new("ListTodos", "Empty", "Todo").response_stream(true);
        assert_eq!(
            serde_json::to_value(&method).unwrap(),
            json!({
                "name": "ListTodos",
                "requestStream": false,
                "responseStream": true,
                "requestType": "Empty",
                "responseType": "Todo"
            })
        );
    }
}
