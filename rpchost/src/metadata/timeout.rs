use http::{HeaderMap, HeaderValue};
use std::time::Duration;

pub(crate) const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

const SECONDS_IN_HOUR: u64 = 60 * 60;
const SECONDS_IN_MINUTE: u64 = 60;

/// Parse the `grpc-timeout` header, if present.
///
/// On failure the offending value is returned so the caller can log it.
/// Follows the [gRPC over HTTP2 spec](https://github.com/grpc/grpc/blob/master/doc/PROTOCOL-HTTP2.md).
pub(crate) fn try_parse_grpc_timeout(
    headers: &HeaderMap<HeaderValue>,
) -> Result<Option<Duration>, &HeaderValue> {
    let Some(val) = headers.get(GRPC_TIMEOUT_HEADER) else {
        return Ok(None);
    };

    let s = val.to_str().map_err(|_| val)?;
    if s.is_empty() {
        return Err(val);
    }
    // to_str only succeeds on ASCII, so the last byte is a char boundary
    let (amount, unit) = s.split_at(s.len() - 1);

    // at most 8 digits, which also rules out overflow below
    if amount.is_empty() || amount.len() > 8 {
        return Err(val);
    }
    let amount: u64 = amount.parse().map_err(|_| val)?;

    let duration = match unit {
        "H" => Duration::from_secs(amount * SECONDS_IN_HOUR),
        "M" => Duration::from_secs(amount * SECONDS_IN_MINUTE),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return Err(val),
    };

    Ok(Some(duration))
}
