//! The streaming delivery engine.
//!
//! A [`StreamSession`] drives a server-streaming producer into a bounded
//! channel. Capacity is reserved before the producer is polled, so item
//! `i + 1` is only produced once item `i` has been accepted, and a slow
//! reader pauses the producer instead of growing a queue. The other end of
//! the channel, the [`SessionReceiver`], is what the response body reads.

use crate::context::{CallContext, CallScope, CancelReason};
use crate::status::Status;
use bytes::Bytes;
use futures_util::{FutureExt, Stream, StreamExt};
use http::HeaderMap;
use http_body::Frame;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The terminal state of a [`StreamSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// The producer still has items to deliver.
    Open,
    /// Every item was delivered and the call ended with `Ok`.
    Completed,
    /// The producer failed or panicked; its error is the terminal status.
    Failed,
    /// The call was cancelled by its deadline or by the caller.
    Cancelled,
}

/// What a [`SessionReceiver`] hands to its reader.
#[derive(Debug)]
pub enum Delivery<T> {
    /// The next item, in production order.
    Item(T),
    /// The call's single terminal status. Nothing follows it.
    Terminal(Status),
}

/// One server-streaming call in flight.
#[derive(Debug)]
pub struct StreamSession<S, T> {
    producer: S,
    scope: CallScope,
    sink: mpsc::Sender<Delivery<T>>,
    state: SessionState,
}

impl<S, T> StreamSession<S, T>
where
    S: Stream<Item = Result<T, Status>>,
{
    /// Pair `producer` with a channel of `capacity` items.
    ///
    /// The session owns `scope`; the call ends when the session does.
    /// A capacity of zero is treated as one.
    pub fn new(producer: S, scope: CallScope, capacity: usize) -> (Self, SessionReceiver<T>) {
        let (sink, rx) = mpsc::channel(capacity.max(1));
        let context = scope.context().clone();

        let session = StreamSession {
            producer,
            scope,
            sink,
            state: SessionState::Open,
        };
        let receiver = SessionReceiver {
            rx,
            context,
            finished: false,
        };

        (session, receiver)
    }

    /// Deliver the producer's items until it completes, fails, or the call
    /// is cancelled. Returns the session's terminal state.
    pub async fn run(mut self) -> SessionState {
        let context = self.scope.context().clone();
        let mut producer = std::pin::pin!(self.producer);
        let sink = &self.sink;

        while self.state == SessionState::Open {
            let permit = tokio::select! {
                biased;
                _ = context.cancelled() => {
                    // the reader may be full, in which case it derives the
                    // terminal status from the cancel reason itself
                    let _ = sink.try_send(Delivery::Terminal(context.cancellation_status()));
                    self.state = SessionState::Cancelled;
                    break;
                }
                permit = sink.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.scope.cancel(CancelReason::PeerGone);
                        self.state = SessionState::Cancelled;
                        break;
                    }
                },
            };

            let next = tokio::select! {
                biased;
                _ = context.cancelled() => {
                    permit.send(Delivery::Terminal(context.cancellation_status()));
                    self.state = SessionState::Cancelled;
                    break;
                }
                _ = sink.closed() => {
                    self.scope.cancel(CancelReason::PeerGone);
                    self.state = SessionState::Cancelled;
                    break;
                }
                next = AssertUnwindSafe(producer.next()).catch_unwind() => next,
            };

            match next {
                Ok(Some(Ok(item))) => permit.send(Delivery::Item(item)),
                Ok(Some(Err(status))) => {
                    debug!(code = ?status.code(), "stream failed");
                    permit.send(Delivery::Terminal(status));
                    self.state = SessionState::Failed;
                }
                Ok(None) => {
                    // a deadline firing after this point no longer counts
                    self.scope.cancel(CancelReason::CallEnded);
                    permit.send(Delivery::Terminal(Status::ok("")));
                    self.state = SessionState::Completed;
                }
                Err(panic) => {
                    let status = Status::from_panic(panic);
                    warn!("stream producer panicked: {}", status.message());
                    permit.send(Delivery::Terminal(status));
                    self.state = SessionState::Failed;
                }
            }
        }

        debug!(state = ?self.state, "stream session finished");
        self.state
    }
}

/// The reading end of a [`StreamSession`].
///
/// Items are yielded in production order and exactly once, followed by
/// exactly one [`Delivery::Terminal`]. Once the call is cancelled by its
/// deadline or by the caller, items still queued are discarded. Dropping the
/// receiver before the terminal status cancels the call.
#[derive(Debug)]
pub struct SessionReceiver<T> {
    rx: mpsc::Receiver<Delivery<T>>,
    context: CallContext,
    finished: bool,
}

impl<T> SessionReceiver<T> {
    /// Receive the next delivery, or `None` after the terminal status.
    pub async fn recv(&mut self) -> Option<Delivery<T>> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Poll for the next delivery.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Delivery<T>>> {
        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            match ready!(self.rx.poll_recv(cx)) {
                Some(Delivery::Item(item)) => {
                    if self.discarding() {
                        continue;
                    }
                    return Poll::Ready(Some(Delivery::Item(item)));
                }
                Some(Delivery::Terminal(status)) => {
                    self.finished = true;
                    return Poll::Ready(Some(Delivery::Terminal(status)));
                }
                None => {
                    self.finished = true;
                    let status = if self.discarding() {
                        self.context.cancellation_status()
                    } else {
                        Status::internal("stream ended without a status")
                    };
                    return Poll::Ready(Some(Delivery::Terminal(status)));
                }
            }
        }
    }

    /// Stop the call. The producer sees the cancellation, nothing queued is
    /// delivered, and the terminal status is `Cancelled`.
    pub fn cancel(&self) {
        self.context.cancel_with(CancelReason::PeerGone);
    }

    /// Returns true once the terminal status has been received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn discarding(&self) -> bool {
        matches!(
            self.context.cancel_reason(),
            Some(CancelReason::DeadlineExceeded | CancelReason::PeerGone)
        )
    }
}

impl<T> Drop for SessionReceiver<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.context.cancel_with(CancelReason::PeerGone);
        }
    }
}

/// Response body of a server-streaming call: one data frame per item, then
/// the status trailers.
#[derive(Debug)]
pub(crate) struct StreamingBody {
    receiver: SessionReceiver<Bytes>,
}

impl StreamingBody {
    pub(crate) fn new(receiver: SessionReceiver<Bytes>) -> Self {
        StreamingBody { receiver }
    }
}

impl http_body::Body for StreamingBody {
    type Data = Bytes;
    type Error = Status;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        let frame = match ready!(this.receiver.poll_recv(cx)) {
            Some(Delivery::Item(frame)) => Frame::data(frame),
            Some(Delivery::Terminal(status)) => {
                let mut trailers = HeaderMap::with_capacity(2);
                status.add_header(&mut trailers);
                Frame::trailers(trailers)
            }
            None => return Poll::Ready(None),
        };

        Poll::Ready(Some(Ok(frame)))
    }

    fn is_end_stream(&self) -> bool {
        self.receiver.is_finished()
    }
}
