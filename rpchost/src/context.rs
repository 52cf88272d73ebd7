//! Per-call context: metadata, deadline and cancellation.

use crate::metadata::MetadataMap;
use crate::status::Status;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::trace;

/// Why a call's cancellation signal fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// The call's deadline elapsed.
    DeadlineExceeded,
    /// The caller went away or stopped reading the response.
    PeerGone,
    /// The call already produced its terminal status.
    CallEnded,
}

#[derive(Debug)]
struct Shared {
    metadata: MetadataMap,
    deadline: Option<Instant>,
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
}

impl Shared {
    fn cancel(&self, reason: CancelReason) {
        // first reason wins, the token only ever moves to cancelled
        if self.reason.set(reason).is_ok() {
            trace!(?reason, "call cancelled");
        }
        self.token.cancel();
    }
}

/// A handler's read-only view of the call it is serving.
///
/// Cloning is cheap, so a streaming handler can move a clone into its
/// producer and consult the metadata or the cancellation signal on every
/// yield. The metadata never changes for the lifetime of the call.
#[derive(Clone, Debug)]
pub struct CallContext {
    shared: Arc<Shared>,
}

impl CallContext {
    /// The metadata the caller attached to this call.
    pub fn metadata(&self) -> &MetadataMap {
        &self.shared.metadata
    }

    /// The instant after which the call is cancelled, if it has a deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.shared.deadline
    }

    /// An observable handle on this call's cancellation signal.
    pub fn cancellation(&self) -> Cancellation {
        Cancellation {
            shared: self.shared.clone(),
        }
    }

    /// Returns true once the call has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Completes when the call is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.shared.token.cancelled()
    }

    /// The reason the call was cancelled, if it has been.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.shared.reason.get().copied()
    }

    /// Cancel the call from the transport side.
    pub(crate) fn cancel_with(&self, reason: CancelReason) {
        self.shared.cancel(reason);
    }

    /// The terminal status of a call that ended because it was cancelled.
    pub(crate) fn cancellation_status(&self) -> Status {
        match self.cancel_reason() {
            Some(reason) => Status::from_cancel_reason(reason),
            None => Status::cancelled("call cancelled"),
        }
    }
}

/// An observable cancellation signal.
///
/// It fires at most once and never resets.
#[derive(Clone, Debug)]
pub struct Cancellation {
    shared: Arc<Shared>,
}

impl Cancellation {
    /// Returns true once the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Completes when the signal fires.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.shared.token.cancelled()
    }

    /// The reason the signal fired, if it has.
    pub fn reason(&self) -> Option<CancelReason> {
        self.shared.reason.get().copied()
    }
}

/// The dispatcher's owning handle on one call.
///
/// Creating a scope with a deadline arms a timer that cancels the call when
/// the deadline elapses. Dropping the scope disarms the timer and cancels the
/// call with [`CancelReason::CallEnded`], which releases any handler work
/// still waiting on the signal.
#[derive(Debug)]
pub struct CallScope {
    context: CallContext,
    timer: Option<JoinHandle<()>>,
}

impl CallScope {
    /// Open a scope for a new call.
    ///
    /// Must be called from within a tokio runtime when `deadline` is set.
    pub fn new(metadata: MetadataMap, deadline: Option<Instant>) -> Self {
        let shared = Arc::new(Shared {
            metadata,
            deadline,
            token: CancellationToken::new(),
            reason: OnceLock::new(),
        });

        let timer = deadline.map(|deadline| {
            let shared = shared.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        shared.cancel(CancelReason::DeadlineExceeded);
                    }
                    _ = shared.token.cancelled() => {}
                }
            })
        });

        CallScope {
            context: CallContext { shared },
            timer,
        }
    }

    /// The handler-facing view of this call.
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Cancel the call.
    ///
    /// Only the first reason is recorded.
    pub fn cancel(&self, reason: CancelReason) {
        self.context.cancel_with(reason);
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.context.cancel_with(CancelReason::CallEnded);
    }
}
