//! gRPC message framing and protobuf payloads.
//!
//! Every message on the wire is prefixed by a one byte compression flag and
//! a four byte big-endian length. Payloads are protobuf, encoded with prost.

mod decode;

pub(crate) use self::decode::read_message;

use crate::status::Status;
use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;

// 5 bytes
pub(crate) const HEADER_SIZE: usize =
    // compression flag
    std::mem::size_of::<u8>() +
    // data length
    std::mem::size_of::<u32>();

/// The default maximum size in bytes of an inbound message. Defaults to 4MB.
pub(crate) const DEFAULT_MAX_RECV_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Encode `message` as a single length-prefixed frame.
pub(crate) fn encode_message<M: Message>(message: &M) -> Result<Bytes, Status> {
    let len = message.encoded_len();
    let frame_len = u32::try_from(len)
        .map_err(|_| Status::internal(format!("message of {} bytes is too large to send", len)))?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + len);
    buf.put_u8(0);
    buf.put_u32(frame_len);
    message
        .encode(&mut buf)
        .map_err(|err| Status::internal(format!("failed to encode message: {}", err)))?;

    Ok(buf.freeze())
}

/// Decode a protobuf payload, without its frame header, into `M`.
pub(crate) fn decode_message<M: Message + Default>(payload: Bytes) -> Result<M, Status> {
    M::decode(payload).map_err(|err| {
        Status::invalid_argument(format!(
            "failed to decode {}: {}",
            std::any::type_name::<M>(),
            err
        ))
    })
}
