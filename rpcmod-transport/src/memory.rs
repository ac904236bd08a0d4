// In-memory loopback transport
// Runs service handlers in-process on tokio tasks, with the same call
// semantics a network client would have: responses go through a schema-aware
// decoder, streams end with exactly one terminal event, and cancel() ends the
// call with a Cancelled status.

use crate::codec::ResponseDecoder;
use crate::metadata::Metadata;
use crate::status::{Status, TransportError};
use crate::transport::{
    CallHandle, Completion, EventStream, MethodDescriptor, RequestStream, RpcClient, StreamEvent,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{stream, FutureExt};
use rpcmod_core::{DefaultOverlay, SchemaRegistry};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type UnaryFn = dyn Fn(Value, Metadata) -> BoxFuture<'static, Result<Value, Status>> + Send + Sync;
type ClientStreamingFn =
    dyn Fn(RequestStream, Metadata) -> BoxFuture<'static, Result<Value, Status>> + Send + Sync;
type ServerStreamingFn =
    dyn Fn(Value, Metadata, ResponseSink) -> BoxFuture<'static, Result<(), Status>> + Send + Sync;
type BidiStreamingFn = dyn Fn(RequestStream, Metadata, ResponseSink) -> BoxFuture<'static, Result<(), Status>>
    + Send
    + Sync;

enum Handler {
    Unary(Arc<UnaryFn>),
    ClientStreaming(Arc<ClientStreamingFn>),
    ServerStreaming(Arc<ServerStreamingFn>),
    BidiStreaming(Arc<BidiStreamingFn>),
}

impl Handler {
    fn kind(&self) -> &'static str {
        match self {
            Handler::Unary(_) => "unary",
            Handler::ClientStreaming(_) => "client streaming",
            Handler::ServerStreaming(_) => "server streaming",
            Handler::BidiStreaming(_) => "bidirectional streaming",
        }
    }
}

struct Route {
    descriptor: MethodDescriptor,
    handler: Handler,
}

/// Sending half of a response stream, handed to streaming handlers.
///
/// Every message is decoded against the method's response type before it
/// reaches the caller.
#[derive(Clone)]
pub struct ResponseSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
    decoder: Arc<ResponseDecoder>,
    response_type: Arc<str>,
}

impl ResponseSink {
    pub fn send(&self, message: Value) -> Result<(), TransportError> {
        let decoded = self.decoder.decode(message, &self.response_type);
        self.tx
            .send(StreamEvent::Data(decoded))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

/// A service definition: a schema plus one handler per method.
pub struct MemoryService {
    name: String,
    registry: SchemaRegistry,
    routes: Vec<Route>,
}

impl MemoryService {
    pub fn new(name: impl Into<String>, registry: SchemaRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
            routes: Vec::new(),
        }
    }

    fn route(mut self, descriptor: MethodDescriptor, handler: Handler) -> Self {
        if self.routes.iter().any(|r| r.descriptor.name == descriptor.name) {
            warn!("Replacing handler for method '{}'", descriptor.name);
            self.routes.retain(|r| r.descriptor.name != descriptor.name);
        }
        self.routes.push(Route {
            descriptor,
            handler,
        });
        self
    }

    pub fn unary<F, Fut>(
        self,
        name: &str,
        request_type: &str,
        response_type: &str,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, Metadata) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Status>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::new(name, request_type, response_type);
        let handler: Arc<UnaryFn> = Arc::new(move |request: Value, metadata: Metadata| {
            handler(request, metadata).boxed()
        });
        self.route(descriptor, Handler::Unary(handler))
    }

    pub fn client_streaming<F, Fut>(
        self,
        name: &str,
        request_type: &str,
        response_type: &str,
        handler: F,
    ) -> Self
    where
        F: Fn(RequestStream, Metadata) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Status>> + Send + 'static,
    {
        let descriptor =
            MethodDescriptor::new(name, request_type, response_type).request_stream(true);
        let handler: Arc<ClientStreamingFn> =
            Arc::new(move |requests: RequestStream, metadata: Metadata| {
                handler(requests, metadata).boxed()
            });
        self.route(descriptor, Handler::ClientStreaming(handler))
    }

    pub fn server_streaming<F, Fut>(
        self,
        name: &str,
        request_type: &str,
        response_type: &str,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, Metadata, ResponseSink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let descriptor =
            MethodDescriptor::new(name, request_type, response_type).response_stream(true);
        let handler: Arc<ServerStreamingFn> =
            Arc::new(move |request: Value, metadata: Metadata, sink: ResponseSink| {
                handler(request, metadata, sink).boxed()
            });
        self.route(descriptor, Handler::ServerStreaming(handler))
    }

    pub fn bidi_streaming<F, Fut>(
        self,
        name: &str,
        request_type: &str,
        response_type: &str,
        handler: F,
    ) -> Self
    where
        F: Fn(RequestStream, Metadata, ResponseSink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::new(name, request_type, response_type)
            .request_stream(true)
            .response_stream(true);
        let handler: Arc<BidiStreamingFn> =
            Arc::new(move |requests: RequestStream, metadata: Metadata, sink: ResponseSink| {
                handler(requests, metadata, sink).boxed()
            });
        self.route(descriptor, Handler::BidiStreaming(handler))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect a client to this service.
    pub fn into_client(self) -> MemoryClient {
        let decoder = Arc::new(ResponseDecoder::new(self.registry));
        debug!(
            "Serving '{}' in memory with {} methods",
            self.name,
            self.routes.len()
        );
        MemoryClient {
            inner: Arc::new(Inner {
                name: self.name,
                routes: self.routes,
            }),
            decoder,
        }
    }
}

impl std::fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let methods: Vec<&str> = self.routes.iter().map(|r| r.descriptor.name.as_str()).collect();
        f.debug_struct("MemoryService")
            .field("name", &self.name)
            .field("methods", &methods)
            .finish_non_exhaustive()
    }
}

struct Inner {
    name: String,
    routes: Vec<Route>,
}

impl Inner {
    fn find(&self, method: &str) -> Result<&Route, Status> {
        self.routes
            .iter()
            .find(|r| r.descriptor.name == method)
            .ok_or_else(|| {
                Status::unimplemented(format!("Method '{}' not found on '{}'", method, self.name))
            })
    }

    fn wrong_shape(&self, route: &Route, expected: &str) -> Status {
        Status::unimplemented(format!(
            "Method '{}' is {}, not {}",
            route.descriptor.name,
            route.handler.kind(),
            expected
        ))
    }

    fn sink(
        &self,
        route: &Route,
        decoder: &Arc<ResponseDecoder>,
    ) -> (ResponseSink, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ResponseSink {
            tx,
            decoder: Arc::clone(decoder),
            response_type: Arc::from(route.descriptor.response_type.as_str()),
        };
        (sink, rx)
    }
}

/// Client side of an in-memory service.
///
/// Clones share the service's routes and their decoder. A client returned by
/// [`RpcClient::with_default_overlay`] shares the routes only.
#[derive(Clone)]
pub struct MemoryClient {
    inner: Arc<Inner>,
    decoder: Arc<ResponseDecoder>,
}

impl MemoryClient {
    pub fn decoder(&self) -> &ResponseDecoder {
        &self.decoder
    }
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("service", &self.inner.name)
            .finish_non_exhaustive()
    }
}

fn failed_events(status: Status) -> EventStream {
    Box::pin(stream::iter([StreamEvent::Error(status)]))
}

fn event_stream(rx: mpsc::UnboundedReceiver<StreamEvent>) -> EventStream {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }))
}

/// Drive a streaming handler to completion and emit the terminal event.
fn spawn_streaming<F>(
    method: String,
    work: F,
    tx: mpsc::UnboundedSender<StreamEvent>,
    cancel: Option<CancellationToken>,
) where
    F: Future<Output = Result<(), Status>> + Send + 'static,
{
    tokio::spawn(async move {
        let cancel = cancel.unwrap_or_else(CancellationToken::new);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Status::cancelled()),
            result = work => result,
        };
        let terminal = match result {
            Ok(()) => StreamEvent::End,
            Err(status) => {
                debug!("Stream '{}' terminated: {}", method, status);
                StreamEvent::Error(status)
            }
        };
        // the caller may already have dropped the stream
        let _ = tx.send(terminal);
    });
}

#[async_trait]
impl RpcClient for MemoryClient {
    fn service_name(&self) -> &str {
        &self.inner.name
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        self.inner
            .routes
            .iter()
            .map(|r| r.descriptor.clone())
            .collect()
    }

    fn with_default_overlay(&self, overlay: &DefaultOverlay) -> Arc<dyn RpcClient> {
        debug!(
            "Binding '{}' with {} default overrides",
            self.inner.name,
            overlay.len()
        );
        Arc::new(MemoryClient {
            inner: Arc::clone(&self.inner),
            decoder: Arc::new(self.decoder.with_overlay(overlay)),
        })
    }

    async fn unary(
        &self,
        method: &str,
        request: Value,
        metadata: Metadata,
    ) -> Result<Value, Status> {
        let route = self.inner.find(method)?;
        let Handler::Unary(handler) = &route.handler else {
            return Err(self.inner.wrong_shape(route, "unary"));
        };
        trace!("Unary call '{}'", method);
        let response = handler(request, metadata).await?;
        Ok(self.decoder.decode(response, &route.descriptor.response_type))
    }

    fn client_stream(&self, method: &str, metadata: Metadata) -> (CallHandle, Completion) {
        let (handle, requests) = CallHandle::channel();
        let route = match self.inner.find(method) {
            Ok(route) => route,
            Err(status) => return (handle, futures::future::ready(Err(status)).boxed()),
        };
        let Handler::ClientStreaming(handler) = &route.handler else {
            let status = self.inner.wrong_shape(route, "client streaming");
            return (handle, futures::future::ready(Err(status)).boxed());
        };

        trace!("Client streaming call '{}'", method);
        let work = handler(requests, metadata);
        let cancel = handle.cancellation_token();
        let decoder = Arc::clone(&self.decoder);
        let response_type = route.descriptor.response_type.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Status::cancelled()),
                result = work => result.map(|v| decoder.decode(v, &response_type)),
            };
            let _ = tx.send(result);
        });

        let completion = async move {
            rx.await
                .unwrap_or_else(|_| Err(Status::internal("Call dropped before completion")))
        };
        (handle, completion.boxed())
    }

    fn server_stream(&self, method: &str, request: Value, metadata: Metadata) -> EventStream {
        let route = match self.inner.find(method) {
            Ok(route) => route,
            Err(status) => return failed_events(status),
        };
        let Handler::ServerStreaming(handler) = &route.handler else {
            return failed_events(self.inner.wrong_shape(route, "server streaming"));
        };

        trace!("Server streaming call '{}'", method);
        let (sink, rx) = self.inner.sink(route, &self.decoder);
        let tx = sink.tx.clone();
        spawn_streaming(method.to_string(), handler(request, metadata, sink), tx, None);
        event_stream(rx)
    }

    fn bidi_stream(&self, method: &str, metadata: Metadata) -> (CallHandle, EventStream) {
        let (handle, requests) = CallHandle::channel();
        let route = match self.inner.find(method) {
            Ok(route) => route,
            Err(status) => return (handle, failed_events(status)),
        };
        let Handler::BidiStreaming(handler) = &route.handler else {
            let status = self.inner.wrong_shape(route, "bidirectional streaming");
            return (handle, failed_events(status));
        };

        trace!("Bidirectional streaming call '{}'", method);
        let (sink, rx) = self.inner.sink(route, &self.decoder);
        let tx = sink.tx.clone();
        spawn_streaming(
            method.to_string(),
            handler(requests, metadata, sink),
            tx,
            Some(handle.cancellation_token()),
        );
        (handle, event_stream(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;
    use futures::StreamExt;
    use rpcmod_core::{FieldDefinition, MessageDefinition};
    use serde_json::json;

    fn service() -> MemoryService {
        let registry = SchemaRegistry::new(&[MessageDefinition::new(
            "Item",
            vec![
                FieldDefinition::new("id", "string"),
                FieldDefinition::new("count", "int64"),
            ],
        )]);
        MemoryService::new("test.Items", registry)
            .unary("Get", "Item", "Item", |request, _| async move {
                Ok(json!({ "id": request["id"], "extra": 1 }))
            })
            .client_streaming("Sum", "Item", "Item", |requests, _| async move {
                let items: Vec<Value> = requests.collect().await;
                Ok(json!({ "id": "sum", "count": items.len() }))
            })
            .server_streaming("List", "Item", "Item", |_, _, sink| async move {
                for i in 0..3 {
                    sink.send(json!({ "id": i.to_string(), "count": i }))?;
                }
                Ok::<(), Status>(())
            })
            .bidi_streaming("Echo", "Item", "Item", |mut requests, _, sink| async move {
                while let Some(item) = requests.next().await {
                    sink.send(item)?;
                }
                Ok::<(), Status>(())
            })
    }

    #[tokio::test]
    async fn test_unary_decodes_response() {
        let client = service().into_client();
        let out = client
            .unary("Get", json!({ "id": "7" }), Metadata::new())
            .await
            .unwrap();
        assert_eq!(out, json!({ "id": "7", "count": "0" }));
    }

    #[tokio::test]
    async fn test_unknown_method_and_wrong_shape() {
        let client = service().into_client();
        let err = client
            .unary("Missing", json!({}), Metadata::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);

        let err = client.unary("List", json!({}), Metadata::new()).await.unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);

        let events: Vec<StreamEvent> = client
            .server_stream("Get", json!({}), Metadata::new())
            .collect()
            .await;
        assert!(matches!(events.as_slice(), [StreamEvent::Error(_)]));
    }

    #[tokio::test]
    async fn test_client_stream_completes_on_end() {
        let client = service().into_client();
        let (handle, completion) = client.client_stream("Sum", Metadata::new());
        for i in 0..4 {
            handle.write(json!({ "id": i.to_string() })).unwrap();
        }
        handle.end().unwrap();
        assert_eq!(completion.await.unwrap(), json!({ "id": "sum", "count": "4" }));
    }

    #[tokio::test]
    async fn test_server_stream_emits_terminal_end() {
        let client = service().into_client();
        let events: Vec<StreamEvent> = client
            .server_stream("List", json!({}), Metadata::new())
            .collect()
            .await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[1], StreamEvent::Data(json!({ "id": "1", "count": "1" })));
        assert_eq!(events[3], StreamEvent::End);
    }

    #[tokio::test]
    async fn test_bidi_cancel_reports_cancelled() {
        let client = service().into_client();
        let (handle, mut events) = client.bidi_stream("Echo", Metadata::new());

        handle.write(json!({ "id": "a" })).unwrap();
        assert!(matches!(events.next().await, Some(StreamEvent::Data(_))));

        handle.cancel();
        match events.next().await {
            Some(StreamEvent::Error(status)) => {
                assert_eq!(status.code(), Code::Cancelled);
                assert_eq!(status.message(), "Cancelled");
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert!(events.next().await.is_none());
    }
}
