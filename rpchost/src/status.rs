use crate::body::{self, BoxBody};
use crate::context::CancelReason;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue};
use percent_encoding::{percent_decode, percent_encode, AsciiSet, CONTROLS};
use std::{any::Any, borrow::Cow, error::Error, fmt, sync::Arc};
use tracing::trace;

const ENCODING_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'?')
    .add(b'{')
    .add(b'}');

pub(crate) const GRPC_STATUS_HEADER: &str = "grpc-status";
pub(crate) const GRPC_MESSAGE_HEADER: &str = "grpc-message";
pub(crate) const GRPC_CONTENT_TYPE: HeaderValue = HeaderValue::from_static("application/grpc");

/// The terminal outcome of a call.
///
/// Every call served by the host ends with exactly one `Status`. For a
/// successful call the code is [`Code::Ok`]; everything else is a failure the
/// caller receives as `grpc-status` / `grpc-message` trailers.
///
/// ```rust
/// # use rpchost::{Code, Status};
/// let status = Status::invalid_argument("number must be 1..12, got 13");
///
/// assert_eq!(status.code(), Code::InvalidArgument);
/// assert_eq!(status.message(), "number must be 1..12, got 13");
/// ```
#[derive(Clone)]
pub struct Status {
    code: Code,
    message: String,
    source: Option<Arc<dyn Error + Send + Sync + 'static>>,
}

/// gRPC status codes used by [`Status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    /// The call completed successfully.
    Ok = 0,
    /// The call was cancelled, usually by the caller going away.
    Cancelled = 1,
    /// Unknown error.
    Unknown = 2,
    /// The request message was rejected by the handler or could not be decoded.
    InvalidArgument = 3,
    /// The call's deadline elapsed before it finished.
    DeadlineExceeded = 4,
    /// A requested entity was not found.
    NotFound = 5,
    /// The entity already exists.
    AlreadyExists = 6,
    /// The caller may not perform this call.
    PermissionDenied = 7,
    /// A resource has been exhausted.
    ResourceExhausted = 8,
    /// The system is not in the required state.
    FailedPrecondition = 9,
    /// The call was aborted.
    Aborted = 10,
    /// A value was outside its valid range.
    OutOfRange = 11,
    /// The service or method is not served here.
    Unimplemented = 12,
    /// An invariant of the host or the handler was broken.
    Internal = 13,
    /// The service is currently unavailable.
    Unavailable = 14,
    /// Unrecoverable data loss.
    DataLoss = 15,
    /// Missing or invalid credentials.
    Unauthenticated = 16,
}

impl Code {
    /// Map a numeric code, as found in the `grpc-status` header, to a `Code`.
    ///
    /// Unrecognized values map to [`Code::Unknown`].
    pub fn from_i32(i: i32) -> Code {
        match i {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => {
                trace!("unrecognized grpc-status {}", i);
                Code::Unknown
            }
        }
    }

    /// Short human readable description of the code.
    pub fn description(&self) -> &'static str {
        match self {
            Code::Ok => "The operation completed successfully",
            Code::Cancelled => "The operation was cancelled",
            Code::Unknown => "Unknown error",
            Code::InvalidArgument => "Client specified an invalid argument",
            Code::DeadlineExceeded => "Deadline expired before operation could complete",
            Code::NotFound => "Some requested entity was not found",
            Code::AlreadyExists => "Some entity that we attempted to create already exists",
            Code::PermissionDenied => {
                "The caller does not have permission to execute the specified operation"
            }
            Code::ResourceExhausted => "Some resource has been exhausted",
            Code::FailedPrecondition => {
                "The system is not in a state required for the operation's execution"
            }
            Code::Aborted => "The operation was aborted",
            Code::OutOfRange => "Operation was attempted past the valid range",
            Code::Unimplemented => "Operation is not implemented or not supported",
            Code::Internal => "Internal error",
            Code::Unavailable => "The service is currently unavailable",
            Code::DataLoss => "Unrecoverable data loss or corruption",
            Code::Unauthenticated => "The request does not have valid authentication credentials",
        }
    }

    fn to_header_value(self) -> HeaderValue {
        HeaderValue::from(self as i32)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.description(), f)
    }
}

impl From<i32> for Code {
    fn from(i: i32) -> Self {
        Code::from_i32(i)
    }
}

impl From<Code> for i32 {
    #[inline]
    fn from(code: Code) -> i32 {
        code as i32
    }
}

// ===== impl Status =====

impl Status {
    /// Create a new `Status` with the associated code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Status {
        Status {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// The call completed successfully.
    pub fn ok(message: impl Into<String>) -> Status {
        Status::new(Code::Ok, message)
    }

    /// The call was cancelled.
    pub fn cancelled(message: impl Into<String>) -> Status {
        Status::new(Code::Cancelled, message)
    }

    /// Unknown error.
    pub fn unknown(message: impl Into<String>) -> Status {
        Status::new(Code::Unknown, message)
    }

    /// The request is invalid regardless of system state, e.g. a month number
    /// outside 1..12.
    pub fn invalid_argument(message: impl Into<String>) -> Status {
        Status::new(Code::InvalidArgument, message)
    }

    /// The deadline elapsed before the call finished.
    pub fn deadline_exceeded(message: impl Into<String>) -> Status {
        Status::new(Code::DeadlineExceeded, message)
    }

    /// A requested entity was not found.
    pub fn not_found(message: impl Into<String>) -> Status {
        Status::new(Code::NotFound, message)
    }

    /// A value was outside its valid range.
    pub fn out_of_range(message: impl Into<String>) -> Status {
        Status::new(Code::OutOfRange, message)
    }

    /// The service or method is not implemented.
    pub fn unimplemented(message: impl Into<String>) -> Status {
        Status::new(Code::Unimplemented, message)
    }

    /// Something the host or a handler relies on was broken.
    pub fn internal(message: impl Into<String>) -> Status {
        Status::new(Code::Internal, message)
    }

    /// The service is currently unavailable.
    pub fn unavailable(message: impl Into<String>) -> Status {
        Status::new(Code::Unavailable, message)
    }

    /// The inbound call envelope could not be parsed. The call never reaches
    /// a handler.
    pub fn malformed_request(message: impl fmt::Display) -> Status {
        Status::new(Code::Internal, format!("malformed request: {}", message))
    }

    /// No service with this name is registered.
    pub fn unknown_service(service: &str) -> Status {
        Status::new(Code::Unimplemented, format!("unknown service {}", service))
    }

    /// The service is registered but has no method with this name.
    pub fn unknown_method(service: &str, method: &str) -> Status {
        Status::new(
            Code::Unimplemented,
            format!("unknown method {} for service {}", method, service),
        )
    }

    /// The terminal status of a call whose cancellation signal fired.
    pub fn from_cancel_reason(reason: CancelReason) -> Status {
        match reason {
            CancelReason::DeadlineExceeded => Status::deadline_exceeded("deadline exceeded"),
            CancelReason::PeerGone => Status::cancelled("call cancelled by peer"),
            CancelReason::CallEnded => Status::cancelled("call ended"),
        }
    }

    /// The status of a call whose handler panicked.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Status {
        let reason = if let Some(s) = payload.downcast_ref::<&'static str>() {
            s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "unknown panic payload"
        };

        Status::internal(format!("handler panicked: {}", reason))
    }

    /// Create a `Status` from an arbitrary error.
    ///
    /// Walks the source chain looking for a `Status` or an HTTP/2 error and
    /// falls back to [`Code::Unknown`].
    pub fn from_error(err: Box<dyn Error + Send + Sync + 'static>) -> Status {
        let err = match err.downcast::<Status>() {
            Ok(status) => return *status,
            Err(err) => err,
        };

        if let Some(status) = find_status_in_source_chain(&*err) {
            return status;
        }

        let mut status = Status::new(Code::Unknown, err.to_string());
        status.source = Some(err.into());
        status
    }

    /// Get the gRPC `Code` of this `Status`.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the text error message of this `Status`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Read a status back out of response trailers.
    pub fn from_header_map(header_map: &HeaderMap) -> Option<Status> {
        let code = header_map.get(GRPC_STATUS_HEADER)?;
        let code = code
            .to_str()
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .map(Code::from_i32)
            .unwrap_or(Code::Unknown);

        let message = header_map
            .get(GRPC_MESSAGE_HEADER)
            .map(|header| {
                percent_decode(header.as_bytes())
                    .decode_utf8_lossy()
                    .into_owned()
            })
            .unwrap_or_default();

        Some(Status::new(code, message))
    }

    /// Render this status as the `grpc-status` / `grpc-message` pair.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut header_map = HeaderMap::with_capacity(2);
        self.add_header(&mut header_map);
        header_map
    }

    /// Add `grpc-status` and `grpc-message` to `header_map`.
    pub fn add_header(&self, header_map: &mut HeaderMap) {
        header_map.insert(GRPC_STATUS_HEADER, self.code.to_header_value());

        if self.message.is_empty() {
            return;
        }

        let encoded = Bytes::copy_from_slice(
            Cow::from(percent_encode(self.message.as_bytes(), ENCODING_SET)).as_bytes(),
        );
        // percent encoding leaves only visible ASCII behind
        if let Ok(value) = HeaderValue::from_maybe_shared(encoded) {
            header_map.insert(GRPC_MESSAGE_HEADER, value);
        }
    }

    /// Build a trailers-only `http::Response` carrying this status.
    pub fn into_http(self) -> http::Response<BoxBody> {
        let mut response = http::Response::new(body::empty());

        let headers = response.headers_mut();
        headers.insert(http::header::CONTENT_TYPE, GRPC_CONTENT_TYPE);
        self.add_header(headers);

        response
    }
}

fn find_status_in_source_chain(err: &(dyn Error + 'static)) -> Option<Status> {
    let mut source = Some(err);

    while let Some(err) = source {
        if let Some(status) = err.downcast_ref::<Status>() {
            return Some(Status::new(status.code, status.message.clone()));
        }

        if let Some(h2) = err.downcast_ref::<h2::Error>() {
            return Some(Status::from_h2_error(h2));
        }

        source = err.source();
    }

    None
}

impl Status {
    fn from_h2_error(err: &h2::Error) -> Status {
        // See https://github.com/grpc/grpc/blob/3977c30/doc/PROTOCOL-HTTP2.md#errors
        let code = match err.reason() {
            Some(h2::Reason::CANCEL) => Code::Cancelled,
            Some(h2::Reason::REFUSED_STREAM) => Code::Unavailable,
            Some(h2::Reason::ENHANCE_YOUR_CALM) => Code::ResourceExhausted,
            Some(h2::Reason::INADEQUATE_SECURITY) => Code::PermissionDenied,
            Some(_) => Code::Internal,
            None => Code::Unknown,
        };

        Status::new(code, format!("h2 protocol error: {}", err))
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Status");

        builder.field("code", &self.code);

        if !self.message.is_empty() {
            builder.field("message", &self.message);
        }

        builder.field("source", &self.source);

        builder.finish()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status: {:?}, message: {:?}",
            self.code(),
            self.message()
        )
    }
}

impl Error for Status {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|err| (&**err) as _)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Nested(Box<dyn Error + Send + Sync>);

    impl fmt::Display for Nested {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "nested error: {}", self.0)
        }
    }

    impl Error for Nested {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&*self.0)
        }
    }

    #[test]
    fn from_error_status() {
        let orig = Status::new(Code::OutOfRange, "weeaboo");
        let found = Status::from_error(Box::new(orig));

        assert_eq!(found.code(), Code::OutOfRange);
        assert_eq!(found.message(), "weeaboo");
    }

    #[test]
    fn from_error_nested() {
        let orig = Nested(Box::new(Status::new(Code::OutOfRange, "weeaboo")));
        let found = Status::from_error(Box::new(orig));

        assert_eq!(found.code(), Code::OutOfRange);
        assert_eq!(found.message(), "weeaboo");
    }

    #[test]
    fn from_error_h2_cancel() {
        let orig = h2::Error::from(h2::Reason::CANCEL);
        let found = Status::from_error(Box::new(orig));

        assert_eq!(found.code(), Code::Cancelled);
    }

    #[test]
    fn from_error_unknown() {
        let found = Status::from_error("peek-a-boo".into());

        assert_eq!(found.code(), Code::Unknown);
        assert_eq!(found.message(), "peek-a-boo");
    }

    #[test]
    fn code_from_i32() {
        for i in 0..=(Code::Unauthenticated as i32) {
            let code = Code::from(i);
            assert_eq!(i, code as i32, "Code::from({}) returned {:?}", i, code);
        }

        assert_eq!(Code::from(-1), Code::Unknown);
        assert_eq!(Code::from(17), Code::Unknown);
    }

    #[test]
    fn header_map_round_trips_message() {
        let status = Status::invalid_argument("number must be 1..12, got 13");
        let headers = status.to_header_map();

        assert_eq!(headers[GRPC_STATUS_HEADER], "3");
        assert_eq!(
            headers[GRPC_MESSAGE_HEADER],
            "number%20must%20be%201..12,%20got%2013"
        );

        let parsed = Status::from_header_map(&headers).unwrap();
        assert_eq!(parsed.code(), Code::InvalidArgument);
        assert_eq!(parsed.message(), "number must be 1..12, got 13");
    }

    #[test]
    fn ok_status_omits_message() {
        let headers = Status::ok("").to_header_map();

        assert_eq!(headers[GRPC_STATUS_HEADER], "0");
        assert!(!headers.contains_key(GRPC_MESSAGE_HEADER));
    }

    #[test]
    fn taxonomy_codes() {
        assert_eq!(Status::malformed_request("bad path").code(), Code::Internal);
        assert_eq!(Status::unknown_service("a.B").code(), Code::Unimplemented);
        assert_eq!(Status::unknown_method("a.B", "C").code(), Code::Unimplemented);
        assert_eq!(
            Status::from_cancel_reason(CancelReason::DeadlineExceeded).code(),
            Code::DeadlineExceeded
        );
        assert_eq!(
            Status::from_cancel_reason(CancelReason::PeerGone).code(),
            Code::Cancelled
        );
    }

    #[test]
    fn panic_payloads() {
        let status = Status::from_panic(Box::new("boom"));
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "handler panicked: boom");

        let status = Status::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(status.message(), "handler panicked: owned boom");

        let status = Status::from_panic(Box::new(42u8));
        assert_eq!(status.message(), "handler panicked: unknown panic payload");
    }

    #[test]
    fn trailers_only_response() {
        let response = Status::unknown_service("nope.Nope").into_http();

        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers()[http::header::CONTENT_TYPE], "application/grpc");
        assert_eq!(response.headers()[GRPC_STATUS_HEADER], "12");
    }
}
