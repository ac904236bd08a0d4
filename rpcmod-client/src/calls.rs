// Call adapters
// Wrap the transport's raw call objects so that every inbound payload goes
// through the mod pipeline. Outbound writes, end and cancel are forwarded to
// the transport untouched.

use crate::error::CallError;
use futures::future::{BoxFuture, Shared};
use futures::stream::FusedStream;
use futures::{FutureExt, Stream, StreamExt, TryStreamExt};
use rpcmod_core::{ModPipeline, SchemaRegistry};
use rpcmod_transport::{CallHandle, Completion, EventStream, StreamEvent, TransportError};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tracing::trace;

/// Registry and pipeline shared by every call of one client.
#[derive(Debug, Clone)]
pub(crate) struct ModContext {
    registry: Option<Arc<SchemaRegistry>>,
    pipeline: Arc<ModPipeline>,
}

impl ModContext {
    pub(crate) fn new(registry: Option<Arc<SchemaRegistry>>, pipeline: Arc<ModPipeline>) -> Self {
        Self { registry, pipeline }
    }

    pub(crate) fn registry(&self) -> Option<&SchemaRegistry> {
        self.registry.as_deref()
    }

    pub(crate) fn pipeline(&self) -> &ModPipeline {
        &self.pipeline
    }

    /// Run the pipeline over a payload of `response_type`.
    pub(crate) fn transform(&self, payload: Value, response_type: &str) -> Result<Value, CallError> {
        let node = self.registry().and_then(|registry| registry.node(response_type));
        trace!(response_type, "Transforming inbound payload");
        Ok(self.pipeline.apply_mods(payload, node)?)
    }
}

/// Stream of transformed inbound messages.
///
/// Yields one `Ok` per message, in transport order. A transport error or a
/// mod error is yielded once as `Err` and ends the stream.
pub struct ModStream {
    events: EventStream,
    context: ModContext,
    response_type: Arc<str>,
    done: bool,
}

impl ModStream {
    pub(crate) fn new(events: EventStream, context: ModContext, response_type: &str) -> Self {
        Self {
            events,
            context,
            response_type: Arc::from(response_type),
            done: false,
        }
    }

    /// Drain the stream, failing on the first error.
    pub async fn collect_all(self) -> Result<Vec<Value>, CallError> {
        self.try_collect().await
    }
}

impl Stream for ModStream {
    type Item = Result<Value, CallError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match ready!(this.events.poll_next_unpin(cx)) {
            Some(StreamEvent::Data(payload)) => {
                let result = this.context.transform(payload, &this.response_type);
                if result.is_err() {
                    this.done = true;
                }
                Poll::Ready(Some(result))
            }
            Some(StreamEvent::Error(status)) => {
                this.done = true;
                Poll::Ready(Some(Err(CallError::Transport(status))))
            }
            Some(StreamEvent::End) | None => {
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl FusedStream for ModStream {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl std::fmt::Debug for ModStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModStream")
            .field("response_type", &self.response_type)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Deferred, cloneable result of a client-streaming call.
pub type SharedResponse = Shared<BoxFuture<'static, Result<Value, CallError>>>;

/// A client-streaming call in progress.
pub struct ClientStreamCall {
    handle: CallHandle,
    response: SharedResponse,
}

impl ClientStreamCall {
    pub(crate) fn new(
        handle: CallHandle,
        completion: Completion,
        context: ModContext,
        response_type: &str,
    ) -> Self {
        let response_type = response_type.to_string();
        let response = async move {
            let payload = completion.await?;
            context.transform(payload, &response_type)
        }
        .boxed()
        .shared();
        Self { handle, response }
    }

    pub fn write(&self, message: Value) -> Result<(), TransportError> {
        self.handle.write(message)
    }

    pub fn end(&self) -> Result<(), TransportError> {
        self.handle.end()
    }

    pub fn cancel(&self) {
        self.handle.cancel()
    }

    /// Resolves once the transport completes the call. Every clone resolves
    /// to the same value.
    pub fn response(&self) -> SharedResponse {
        self.response.clone()
    }

    pub fn handle(&self) -> &CallHandle {
        &self.handle
    }
}

impl std::fmt::Debug for ClientStreamCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientStreamCall")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// A bidirectional call in progress.
#[derive(Debug)]
pub struct BidiStreamCall {
    handle: CallHandle,
    messages: ModStream,
}

impl BidiStreamCall {
    pub(crate) fn new(handle: CallHandle, messages: ModStream) -> Self {
        Self { handle, messages }
    }

    pub fn write(&self, message: Value) -> Result<(), TransportError> {
        self.handle.write(message)
    }

    pub fn end(&self) -> Result<(), TransportError> {
        self.handle.end()
    }

    pub fn cancel(&self) {
        self.handle.cancel()
    }

    /// Transformed inbound messages.
    pub fn messages(&mut self) -> &mut ModStream {
        &mut self.messages
    }

    pub fn handle(&self) -> &CallHandle {
        &self.handle
    }

    pub fn into_parts(self) -> (CallHandle, ModStream) {
        (self.handle, self.messages)
    }
}
