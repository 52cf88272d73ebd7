//! The boundary between the host and the business logic it serves.
//!
//! A handler is anything that turns a decoded [`Request`] into a response
//! message ([`UnaryHandler`]) or into a stream of response messages
//! ([`StreamingHandler`]). Both are implemented for plain async functions and
//! closures, so most services never name these traits:
//!
//! ```rust
//! # use rpchost::{Request, Status};
//! # #[derive(Clone, PartialEq, prost::Message)]
//! # struct HelloReq { #[prost(string, tag = "1")] name: String }
//! # #[derive(Clone, PartialEq, prost::Message)]
//! # struct HelloResp { #[prost(string, tag = "1")] message: String }
//! async fn say_hello(request: Request<HelloReq>) -> Result<HelloResp, Status> {
//!     Ok(HelloResp {
//!         message: format!("Hello {}", request.get_ref().name),
//!     })
//! }
//! ```

use crate::codec::{decode_message, encode_message};
use crate::context::CallContext;
use crate::request::Request;
use crate::status::Status;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use prost::{Message, Name};
use std::{future::Future, marker::PhantomData, pin::Pin, sync::Arc};

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A stream of encoded response frames.
pub(crate) type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, Status>> + Send + 'static>>;

/// Handles a unary call: one request message in, one response message out.
pub trait UnaryHandler<Req>: Send + Sync + 'static {
    /// The response message type.
    type Response: Message + Name + 'static;

    /// Response future.
    type Future: Future<Output = Result<Self::Response, Status>> + Send + 'static;

    /// Serve one call.
    fn call(&self, request: Request<Req>) -> Self::Future;
}

impl<F, Fut, Req, Res> UnaryHandler<Req> for F
where
    F: Fn(Request<Req>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Res, Status>> + Send + 'static,
    Res: Message + Name + 'static,
{
    type Response = Res;
    type Future = Fut;

    fn call(&self, request: Request<Req>) -> Self::Future {
        (self)(request)
    }
}

/// Handles a server-streaming call: one request message in, a finite
/// sequence of response messages out.
///
/// The returned future resolves once the stream is ready to be driven; an
/// error at that point ends the call before any message is sent. Items are
/// pulled one at a time and only when the caller can accept more, so a
/// producer may do arbitrarily slow work between items.
pub trait StreamingHandler<Req>: Send + Sync + 'static {
    /// The message type of each stream item.
    type Response: Message + Name + 'static;

    /// The response stream.
    type Stream: Stream<Item = Result<Self::Response, Status>> + Send + 'static;

    /// Future resolving to the response stream.
    type Future: Future<Output = Result<Self::Stream, Status>> + Send + 'static;

    /// Open the response stream of one call.
    fn call(&self, request: Request<Req>) -> Self::Future;
}

impl<F, Fut, S, Req, Res> StreamingHandler<Req> for F
where
    F: Fn(Request<Req>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S, Status>> + Send + 'static,
    S: Stream<Item = Result<Res, Status>> + Send + 'static,
    Res: Message + Name + 'static,
{
    type Response = Res;
    type Stream = S;
    type Future = Fut;

    fn call(&self, request: Request<Req>) -> Self::Future {
        (self)(request)
    }
}

/// A unary handler behind its codec.
pub(crate) trait ErasedUnary: Send + Sync {
    fn call(&self, payload: Bytes, context: CallContext)
        -> Result<BoxFuture<Result<Bytes, Status>>, Status>;
}

/// A streaming handler behind its codec.
pub(crate) trait ErasedStreaming: Send + Sync {
    fn call(&self, payload: Bytes, context: CallContext)
        -> Result<BoxFuture<Result<FrameStream, Status>>, Status>;
}

/// The handler bound to a method, with its request and response types
/// erased.
#[derive(Clone)]
pub(crate) enum Route {
    Unary(Arc<dyn ErasedUnary>),
    ServerStreaming(Arc<dyn ErasedStreaming>),
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Unary(_) => f.write_str("Route::Unary"),
            Route::ServerStreaming(_) => f.write_str("Route::ServerStreaming"),
        }
    }
}

impl Route {
    pub(crate) fn unary<Req, H>(handler: H) -> Self
    where
        Req: Message + Default + Send + 'static,
        H: UnaryHandler<Req>,
    {
        Route::Unary(Arc::new(Typed {
            handler,
            _req: PhantomData,
        }))
    }

    pub(crate) fn server_streaming<Req, H>(handler: H) -> Self
    where
        Req: Message + Default + Send + 'static,
        H: StreamingHandler<Req>,
    {
        Route::ServerStreaming(Arc::new(Typed {
            handler,
            _req: PhantomData,
        }))
    }
}

struct Typed<H, Req> {
    handler: H,
    _req: PhantomData<fn(Req)>,
}

impl<H, Req> ErasedUnary for Typed<H, Req>
where
    Req: Message + Default + Send + 'static,
    H: UnaryHandler<Req>,
{
    fn call(
        &self,
        payload: Bytes,
        context: CallContext,
    ) -> Result<BoxFuture<Result<Bytes, Status>>, Status> {
        let message = decode_message::<Req>(payload)?;
        let response = self.handler.call(Request::new(message, context));

        Ok(Box::pin(async move {
            let message = response.await?;
            encode_message(&message)
        }))
    }
}

impl<H, Req> ErasedStreaming for Typed<H, Req>
where
    Req: Message + Default + Send + 'static,
    H: StreamingHandler<Req>,
{
    fn call(
        &self,
        payload: Bytes,
        context: CallContext,
    ) -> Result<BoxFuture<Result<FrameStream, Status>>, Status> {
        let message = decode_message::<Req>(payload)?;
        let opened = self.handler.call(Request::new(message, context));

        Ok(Box::pin(async move {
            let stream = opened.await?;
            let frames = stream.map(|item| item.and_then(|message| encode_message(&message)));
            Ok(Box::pin(frames) as FrameStream)
        }))
    }
}
