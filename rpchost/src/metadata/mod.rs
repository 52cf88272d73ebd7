//! Per-call custom metadata.
//!
//! Metadata travels as HTTP/2 headers. Keys are case-insensitive, a key may
//! carry several values, and those values keep the order in which the caller
//! sent them. Keys ending in `-bin` carry base64 encoded binary values.

mod timeout;

pub(crate) use self::timeout::try_parse_grpc_timeout;

use base64::Engine as _;
use http::header::{HeaderName, HeaderValue};
use tracing::trace;

/// Headers that belong to the gRPC protocol itself and never show up as
/// metadata.
const RESERVED_HEADERS: [&str; 7] = [
    "te",
    "content-type",
    "grpc-timeout",
    "grpc-encoding",
    "grpc-accept-encoding",
    "grpc-status",
    "grpc-message",
];

const BINARY_SUFFIX: &str = "-bin";

/// The metadata attached to a call.
///
/// # Examples
///
/// ```
/// # use rpchost::metadata::MetadataMap;
/// let mut map = MetadataMap::new();
///
/// map.append("x-tag", "a").unwrap();
/// map.append("X-Tag", "b").unwrap();
///
/// assert_eq!(map.get_all("x-tag"), vec!["a", "b"]);
/// assert_eq!(map.get("X-TAG"), Some("a"));
/// assert!(map.get_all("x-missing").is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct MetadataMap {
    headers: http::HeaderMap,
}

/// Error returned when a key or value cannot be carried as metadata.
#[derive(Debug)]
pub struct InvalidMetadata {
    what: &'static str,
}

impl std::fmt::Display for InvalidMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid metadata {}", self.what)
    }
}

impl std::error::Error for InvalidMetadata {}

impl MetadataMap {
    /// Create an empty `MetadataMap`.
    pub fn new() -> Self {
        MetadataMap::default()
    }

    /// Build the metadata of an inbound call from its request headers.
    ///
    /// Protocol headers (`te`, `content-type`, `grpc-timeout`, ...) are
    /// dropped; everything else is kept as sent, in the order sent.
    pub fn from_headers(headers: http::HeaderMap) -> Self {
        let mut kept = http::HeaderMap::with_capacity(headers.len());
        let mut current: Option<HeaderName> = None;

        // only the first value of each key carries its name
        for (name, value) in headers {
            if name.is_some() {
                current = name;
            }
            match &current {
                Some(name) if !RESERVED_HEADERS.contains(&name.as_str()) => {
                    kept.append(name.clone(), value);
                }
                _ => {}
            }
        }

        MetadataMap { headers: kept }
    }

    /// Number of values stored, counting every value of a multi-valued key.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if the map holds no values.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns true if the map holds at least one value for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        match key_name(key) {
            Some(name) => self.headers.contains_key(name),
            None => false,
        }
    }

    /// The first value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).into_iter().next()
    }

    /// Every value stored under `key`, in insertion order.
    ///
    /// An absent key yields an empty list. Values that are not printable
    /// ASCII are skipped; binary values belong under `-bin` keys and are read
    /// with [`MetadataMap::get_bin_all`].
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        let Some(name) = key_name(key) else {
            return Vec::new();
        };

        self.headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    /// Every value stored under the binary key `key`, base64 decoded.
    ///
    /// Padded and unpadded encodings are both accepted. Values that fail to
    /// decode are skipped.
    pub fn get_bin_all(&self, key: &str) -> Vec<Vec<u8>> {
        if !key.to_ascii_lowercase().ends_with(BINARY_SUFFIX) {
            return Vec::new();
        }
        let Some(name) = key_name(key) else {
            return Vec::new();
        };

        self.headers
            .get_all(name)
            .iter()
            .filter_map(|value| match BASE64.decode(value.as_bytes()) {
                Ok(decoded) => Some(decoded),
                Err(error) => {
                    trace!("skipping undecodable binary metadata value: {}", error);
                    None
                }
            })
            .collect()
    }

    /// Distinct keys, each yielded once, in the order first seen.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.headers.keys().map(HeaderName::as_str)
    }

    /// Append `value` under `key`, keeping any existing values.
    pub fn append(&mut self, key: &str, value: &str) -> Result<(), InvalidMetadata> {
        let (name, value) = ascii_entry(key, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Replace every value under `key` with `value`.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), InvalidMetadata> {
        let (name, value) = ascii_entry(key, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Append a binary `value` under the `-bin` key `key`.
    pub fn append_bin(&mut self, key: &str, value: impl AsRef<[u8]>) -> Result<(), InvalidMetadata> {
        if !key.to_ascii_lowercase().ends_with(BINARY_SUFFIX) {
            return Err(InvalidMetadata { what: "binary key" });
        }
        let name = key_name(key).ok_or(InvalidMetadata { what: "key" })?;
        let encoded = BASE64.encode(value);
        let value =
            HeaderValue::from_str(&encoded).map_err(|_| InvalidMetadata { what: "value" })?;
        self.headers.append(name, value);
        Ok(())
    }
}

const BASE64: base64::engine::GeneralPurpose = base64::engine::GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    base64::engine::GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(base64::engine::DecodePaddingMode::Indifferent),
);

fn key_name(key: &str) -> Option<HeaderName> {
    HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes()).ok()
}

fn ascii_entry(key: &str, value: &str) -> Result<(HeaderName, HeaderValue), InvalidMetadata> {
    if key.to_ascii_lowercase().ends_with(BINARY_SUFFIX) {
        return Err(InvalidMetadata { what: "ascii key" });
    }
    let name = key_name(key).ok_or(InvalidMetadata { what: "key" })?;
    let value = HeaderValue::from_str(value).map_err(|_| InvalidMetadata { what: "value" })?;
    Ok((name, value))
}
