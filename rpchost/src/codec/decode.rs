use super::HEADER_SIZE;
use crate::status::Status;
use bytes::{Buf, Bytes, BytesMut};
use http_body::Body;
use http_body_util::BodyExt;
use tracing::{debug, trace};

const BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy)]
enum State {
    ReadHeader,
    ReadBody { len: usize },
}

/// Splits a stream of body chunks into length-prefixed messages.
#[derive(Debug)]
pub(crate) struct FrameDecoder {
    buf: BytesMut,
    state: State,
    max_message_size: usize,
}

impl FrameDecoder {
    pub(crate) fn new(max_message_size: usize) -> Self {
        FrameDecoder {
            buf: BytesMut::with_capacity(BUFFER_SIZE),
            state: State::ReadHeader,
            max_message_size,
        }
    }

    pub(crate) fn push(&mut self, mut chunk: impl Buf) {
        while chunk.has_remaining() {
            self.buf.extend_from_slice(chunk.chunk());
            let n = chunk.chunk().len();
            chunk.advance(n);
        }
    }

    /// Returns the next complete message payload, if one is buffered.
    pub(crate) fn next_message(&mut self) -> Result<Option<Bytes>, Status> {
        if let State::ReadHeader = self.state {
            if self.buf.remaining() < HEADER_SIZE {
                return Ok(None);
            }

            match self.buf.get_u8() {
                0 => {}
                1 => {
                    return Err(Status::unimplemented(
                        "compressed messages are not supported by this server",
                    ));
                }
                flag => {
                    trace!("unexpected compression flag");
                    return Err(Status::malformed_request(format!(
                        "invalid compression flag: {} (valid flags are 0 and 1)",
                        flag
                    )));
                }
            }

            let len = self.buf.get_u32() as usize;
            if len > self.max_message_size {
                return Err(Status::out_of_range(format!(
                    "Error, message length too large: found {} bytes, the limit is: {} bytes",
                    len, self.max_message_size
                )));
            }

            self.buf.reserve(len);
            self.state = State::ReadBody { len };
        }

        if let State::ReadBody { len } = self.state {
            if self.buf.remaining() < len {
                return Ok(None);
            }

            self.state = State::ReadHeader;
            return Ok(Some(self.buf.split_to(len).freeze()));
        }

        Ok(None)
    }

    /// Fails if the body ended in the middle of a frame.
    pub(crate) fn finish(&self) -> Result<(), Status> {
        match self.state {
            State::ReadHeader if self.buf.is_empty() => Ok(()),
            _ => Err(Status::malformed_request(format!(
                "body ended with {} bytes of an incomplete message",
                self.buf.len()
            ))),
        }
    }
}

/// Read the single request message of a unary or server-streaming call.
pub(crate) async fn read_message<B>(body: B, max_message_size: usize) -> Result<Bytes, Status>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut decoder = FrameDecoder::new(max_message_size);
    let mut message = None;
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|err| {
            let status = Status::from_error(err.into());
            debug!("request body error: {:?}", status);
            status
        })?;

        let Ok(data) = frame.into_data() else {
            // request trailers carry nothing for us
            continue;
        };

        decoder.push(data);
        while let Some(payload) = decoder.next_message()? {
            if message.replace(payload).is_some() {
                return Err(Status::malformed_request(
                    "expected exactly one request message",
                ));
            }
        }
    }

    decoder.finish()?;

    message.ok_or_else(|| Status::malformed_request("missing request message"))
}
