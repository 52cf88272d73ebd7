//! HTTP body types used for responses.

use crate::status::Status;
use bytes::Bytes;
use futures_util::stream;
use http::HeaderMap;
use http_body::Frame;
use http_body_util::{BodyExt, Empty, StreamBody};

/// A type erased HTTP body used for every response the host sends.
pub type BoxBody = http_body_util::combinators::UnsyncBoxBody<Bytes, Status>;

/// Convert a `http_body::Body` into a `BoxBody`.
pub(crate) fn boxed<B>(body: B) -> BoxBody
where
    B: http_body::Body<Data = Bytes, Error = Status> + Send + 'static,
{
    body.boxed_unsync()
}

/// An empty body, used for trailers-only responses.
pub(crate) fn empty() -> BoxBody {
    boxed(Empty::new().map_err(|never| match never {}))
}

/// A body carrying exactly one encoded message followed by trailers.
pub(crate) fn single(message: Bytes, trailers: HeaderMap) -> BoxBody {
    let frames = [
        Ok::<_, Status>(Frame::data(message)),
        Ok(Frame::trailers(trailers)),
    ];

    boxed(StreamBody::new(stream::iter(frames)))
}
