//! The request dispatcher.
//!
//! [`Dispatcher`] is the `tower` service that sits behind every HTTP/2
//! connection. It validates the call envelope, resolves the handler, opens
//! the call's [`CallScope`] and routes the call to the unary or the streaming
//! path.

use crate::body::{self, BoxBody};
use crate::codec::{read_message, DEFAULT_MAX_RECV_MESSAGE_SIZE};
use crate::context::CallScope;
use crate::handler::{BoxFuture, ErasedStreaming, ErasedUnary, Route};
use crate::metadata::{try_parse_grpc_timeout, MetadataMap};
use crate::registry::Registry;
use crate::status::{Status, GRPC_CONTENT_TYPE};
use crate::streaming::{StreamSession, StreamingBody};
use bytes::Bytes;
use futures_util::FutureExt;
use http::{header::CONTENT_TYPE, Method};
use http_body::Body;
use std::convert::Infallible;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower_service::Service;
use tracing::{debug, info_span, trace, warn, Instrument};

/// The default number of stream items buffered ahead of the caller.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 1;

/// Routes gRPC calls to the handlers of a [`Registry`].
///
/// Cloning is cheap; every connection gets its own clone.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    timeout: Option<Duration>,
    stream_buffer_size: usize,
    max_recv_message_size: usize,
}

impl Dispatcher {
    /// Serve the services of `registry`. The registry can no longer change.
    pub fn new(registry: Registry) -> Self {
        Dispatcher {
            registry: Arc::new(registry),
            timeout: None,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            max_recv_message_size: DEFAULT_MAX_RECV_MESSAGE_SIZE,
        }
    }

    /// Cap the deadline of every call. A shorter `grpc-timeout` sent by the
    /// caller still wins.
    pub fn timeout(self, timeout: Option<Duration>) -> Self {
        Dispatcher { timeout, ..self }
    }

    /// Number of stream items produced ahead of the caller.
    ///
    /// Defaults to `1`. Zero is treated as one.
    pub fn stream_buffer_size(self, size: usize) -> Self {
        Dispatcher {
            stream_buffer_size: size.max(1),
            ..self
        }
    }

    /// Limits the maximum size of a decoded request message.
    ///
    /// Default: `4MB`
    pub fn max_recv_message_size(self, limit: usize) -> Self {
        Dispatcher {
            max_recv_message_size: limit,
            ..self
        }
    }

    /// The registry being served.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn dispatch<B>(self, request: http::Request<B>) -> http::Response<BoxBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<crate::BoxError>,
    {
        let (mut parts, body) = request.into_parts();

        let (service, method) = match parse_envelope(&parts.method, &parts.headers, &parts.uri) {
            Ok(names) => names,
            Err(status) => {
                debug!("rejecting call: {}", status.message());
                return status.into_http();
            }
        };

        let span = info_span!("call", service = %service, method = %method);
        let headers = std::mem::take(&mut parts.headers);

        self.serve_call(service, method, headers, body)
            .instrument(span)
            .await
    }

    async fn serve_call<B>(
        &self,
        service: &str,
        method: &str,
        headers: http::HeaderMap,
        body: B,
    ) -> http::Response<BoxBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<crate::BoxError>,
    {
        let route = match self.registry.resolve(service, method) {
            Ok(resolved) => resolved.route().clone(),
            Err(err) => {
                debug!("{}", err);
                return Status::from(err).into_http();
            }
        };

        let deadline = self.deadline(&headers).map(|timeout| Instant::now() + timeout);
        let scope = CallScope::new(MetadataMap::from_headers(headers), deadline);
        let context = scope.context().clone();

        let payload = tokio::select! {
            biased;
            _ = context.cancelled() => return context.cancellation_status().into_http(),
            payload = read_message(body, self.max_recv_message_size) => match payload {
                Ok(payload) => payload,
                Err(status) => {
                    debug!("bad request message: {}", status.message());
                    return status.into_http();
                }
            },
        };

        match route {
            Route::Unary(handler) => unary(handler, payload, scope).await,
            Route::ServerStreaming(handler) => {
                streaming(handler, payload, scope, self.stream_buffer_size).await
            }
        }
    }

    fn deadline(&self, headers: &http::HeaderMap) -> Option<Duration> {
        let requested = try_parse_grpc_timeout(headers).unwrap_or_else(|value| {
            trace!("Error parsing `grpc-timeout` header {:?}", value);
            None
        });

        // Use the shorter of the two durations, if either are set
        match (requested, self.timeout) {
            (None, None) => None,
            (Some(dur), None) | (None, Some(dur)) => Some(dur),
            (Some(header), Some(server)) => Some(header.min(server)),
        }
    }
}

impl<B> Service<http::Request<B>> for Dispatcher
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<crate::BoxError>,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.dispatch(request).await) })
    }
}

/// Split a request path into its service and method names.
fn parse_envelope<'a>(
    http_method: &Method,
    headers: &http::HeaderMap,
    uri: &'a http::Uri,
) -> Result<(&'a str, &'a str), Status> {
    if *http_method != Method::POST {
        return Err(Status::malformed_request(format!(
            "unexpected HTTP method {}",
            http_method
        )));
    }

    let is_grpc = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/grpc"));
    if !is_grpc {
        return Err(Status::malformed_request("missing gRPC content-type"));
    }

    let path = uri.path();
    path.strip_prefix('/')
        .and_then(|rest| rest.split_once('/'))
        .filter(|(service, method)| {
            !service.is_empty() && !method.is_empty() && !method.contains('/')
        })
        .ok_or_else(|| Status::malformed_request(format!("invalid call path {:?}", path)))
}

async fn unary(
    handler: Arc<dyn ErasedUnary>,
    payload: Bytes,
    scope: CallScope,
) -> http::Response<BoxBody> {
    let context = scope.context().clone();

    let response = match open(|| handler.call(payload, context.clone())) {
        Ok(response) => response,
        Err(status) => return status.into_http(),
    };

    let result = tokio::select! {
        biased;
        _ = context.cancelled() => Err(context.cancellation_status()),
        result = AssertUnwindSafe(response).catch_unwind() => {
            result.unwrap_or_else(|panic| Err(panicked(panic)))
        }
    };
    // the call has its terminal status
    drop(scope);

    match result {
        Ok(message) => grpc_response(body::single(message, Status::ok("").to_header_map())),
        Err(status) => {
            debug!(code = ?status.code(), "call failed: {}", status.message());
            status.into_http()
        }
    }
}

async fn streaming(
    handler: Arc<dyn ErasedStreaming>,
    payload: Bytes,
    scope: CallScope,
    buffer_size: usize,
) -> http::Response<BoxBody> {
    let context = scope.context().clone();

    let opened = match open(|| handler.call(payload, context.clone())) {
        Ok(opened) => opened,
        Err(status) => return status.into_http(),
    };

    let producer = tokio::select! {
        biased;
        _ = context.cancelled() => Err(context.cancellation_status()),
        result = AssertUnwindSafe(opened).catch_unwind() => {
            result.unwrap_or_else(|panic| Err(panicked(panic)))
        }
    };

    let producer = match producer {
        Ok(producer) => producer,
        Err(status) => {
            debug!(code = ?status.code(), "stream failed to open: {}", status.message());
            return status.into_http();
        }
    };

    let (session, receiver) = StreamSession::new(producer, scope, buffer_size);
    tokio::spawn(session.run().in_current_span());

    grpc_response(body::boxed(StreamingBody::new(receiver)))
}

/// Run the synchronous part of a handler call, containing panics.
fn open<F, T>(call: F) -> Result<T, Status>
where
    F: FnOnce() -> Result<T, Status>,
{
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|panic| Err(panicked(panic)))
}

fn panicked(panic: Box<dyn std::any::Any + Send>) -> Status {
    let status = Status::from_panic(panic);
    warn!("{}", status.message());
    status
}

fn grpc_response(body: BoxBody) -> http::Response<BoxBody> {
    let mut response = http::Response::new(body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, GRPC_CONTENT_TYPE);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceDefinition;
    use crate::{Code, Request};
    use bytes::BufMut;
    use http_body_util::{BodyExt, Full};
    use prost::Message;
    use tower::ServiceExt;

    #[derive(Clone, PartialEq, ::prost::Message)]
    struct Number {
        #[prost(int32, tag = "1")]
        value: i32,
    }

    impl prost::Name for Number {
        const NAME: &'static str = "Number";
        const PACKAGE: &'static str = "test";
    }

    async fn double(request: Request<Number>) -> Result<Number, Status> {
        let value = request.get_ref().value;
        if value < 0 {
            return Err(Status::invalid_argument("negative"));
        }
        Ok(Number { value: value * 2 })
    }

    async fn slow(request: Request<Number>) -> Result<Number, Status> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(request.into_inner())
    }

    async fn explode(_: Request<Number>) -> Result<Number, Status> {
        panic!("kaboom");
    }

    async fn count(
        request: Request<Number>,
    ) -> Result<impl futures_util::Stream<Item = Result<Number, Status>>, Status> {
        let n = request.get_ref().value;
        Ok(futures_util::stream::iter((0..n).map(|value| Ok(Number { value }))))
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = Registry::new();
        registry
            .register(
                ServiceDefinition::builder("test.Math")
                    .unary("Double", double)
                    .unary("Slow", slow)
                    .unary("Explode", explode)
                    .server_streaming("Count", count)
                    .build(),
            )
            .unwrap();
        Dispatcher::new(registry)
    }

    fn frame(message: &impl Message) -> Bytes {
        let mut buf = Vec::new();
        buf.put_u8(0);
        buf.put_u32(message.encoded_len() as u32);
        message.encode(&mut buf).unwrap();
        buf.into()
    }

    fn call(path: &str, body: Bytes) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/grpc")
            .body(Full::new(body))
            .unwrap()
    }

    struct Collected {
        headers: http::HeaderMap,
        messages: Vec<Number>,
        status: Status,
    }

    async fn collect(response: http::Response<BoxBody>) -> Collected {
        let (parts, body) = response.into_parts();
        let collected = body.collect().await.unwrap();
        let trailers = collected.trailers().cloned();
        let mut data = collected.to_bytes();

        let mut messages = Vec::new();
        while !data.is_empty() {
            let len = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as usize;
            messages.push(Number::decode(data.slice(5..5 + len)).unwrap());
            data = data.slice(5 + len..);
        }

        // trailers-only responses carry the status in the headers
        let status = trailers
            .as_ref()
            .and_then(Status::from_header_map)
            .or_else(|| Status::from_header_map(&parts.headers))
            .unwrap();

        Collected {
            headers: parts.headers,
            messages,
            status,
        }
    }

    #[tokio::test]
    async fn unary_round_trip() {
        let request = call("/test.Math/Double", frame(&Number { value: 21 }));
        let response = dispatcher().oneshot(request).await.unwrap();
        let collected = collect(response).await;

        assert_eq!(collected.headers[CONTENT_TYPE], "application/grpc");
        assert_eq!(collected.messages, vec![Number { value: 42 }]);
        assert_eq!(collected.status.code(), Code::Ok);
    }

    #[tokio::test]
    async fn handler_error_is_the_terminal_status() {
        let request = call("/test.Math/Double", frame(&Number { value: -1 }));
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;

        assert!(collected.messages.is_empty());
        assert_eq!(collected.status.code(), Code::InvalidArgument);
        assert_eq!(collected.status.message(), "negative");
    }

    #[tokio::test]
    async fn unknown_service_and_method() {
        let request = call("/test.Nope/Double", frame(&Number { value: 1 }));
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;
        assert_eq!(collected.status.code(), Code::Unimplemented);
        assert!(collected.status.message().contains("unknown service"));

        let request = call("/test.Math/Triple", frame(&Number { value: 1 }));
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;
        assert_eq!(collected.status.code(), Code::Unimplemented);
        assert!(collected.status.message().contains("unknown method"));
    }

    #[tokio::test]
    async fn malformed_envelopes_never_reach_handlers() {
        for path in ["/", "/test.Math", "/test.Math/", "//Double", "/a/b/c"] {
            let request = call(path, frame(&Number { value: 1 }));
            let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;
            assert_eq!(collected.status.code(), Code::Internal, "path {}", path);
        }

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/test.Math/Double")
            .header(CONTENT_TYPE, "application/grpc")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;
        assert_eq!(collected.status.code(), Code::Internal);

        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/test.Math/Double")
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(frame(&Number { value: 1 })))
            .unwrap();
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;
        assert_eq!(collected.status.code(), Code::Internal);
    }

    #[tokio::test]
    async fn undecodable_payload_is_invalid_argument() {
        let mut body = vec![0u8, 0, 0, 0, 3];
        body.extend_from_slice(&[0x08, 0xff, 0xff]);
        let request = call("/test.Math/Double", body.into());
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;

        assert_eq!(collected.status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn panicking_handler_is_internal() {
        let request = call("/test.Math/Explode", frame(&Number { value: 1 }));
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;

        assert_eq!(collected.status.code(), Code::Internal);
        assert!(collected.status.message().contains("kaboom"));

        // the dispatcher keeps serving
        let request = call("/test.Math/Double", frame(&Number { value: 2 }));
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;
        assert_eq!(collected.messages, vec![Number { value: 4 }]);
    }

    #[tokio::test]
    async fn grpc_timeout_header_sets_the_deadline() {
        let mut request = call("/test.Math/Slow", frame(&Number { value: 1 }));
        request
            .headers_mut()
            .insert("grpc-timeout", http::HeaderValue::from_static("20m"));

        let started = Instant::now();
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;

        assert_eq!(collected.status.code(), Code::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn server_timeout_caps_the_deadline() {
        let mut request = call("/test.Math/Slow", frame(&Number { value: 1 }));
        request
            .headers_mut()
            .insert("grpc-timeout", http::HeaderValue::from_static("1H"));

        let dispatcher = dispatcher().timeout(Some(Duration::from_millis(20)));
        let collected = collect(dispatcher.oneshot(request).await.unwrap()).await;

        assert_eq!(collected.status.code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn streaming_delivers_in_order() {
        let request = call("/test.Math/Count", frame(&Number { value: 5 }));
        let collected = collect(dispatcher().oneshot(request).await.unwrap()).await;

        let values = collected
            .messages
            .iter()
            .map(|n| n.value)
            .collect::<Vec<_>>();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(collected.status.code(), Code::Ok);
    }

    #[test]
    fn deadline_is_the_shorter_duration() {
        let dispatcher = Dispatcher::new(Registry::new()).timeout(Some(Duration::from_secs(5)));

        let mut headers = http::HeaderMap::new();
        assert_eq!(dispatcher.deadline(&headers), Some(Duration::from_secs(5)));

        headers.insert("grpc-timeout", http::HeaderValue::from_static("2S"));
        assert_eq!(dispatcher.deadline(&headers), Some(Duration::from_secs(2)));

        headers.insert("grpc-timeout", http::HeaderValue::from_static("10S"));
        assert_eq!(dispatcher.deadline(&headers), Some(Duration::from_secs(5)));

        // unparsable values are ignored
        headers.insert("grpc-timeout", http::HeaderValue::from_static("soon"));
        assert_eq!(dispatcher.deadline(&headers), Some(Duration::from_secs(5)));
    }
}
