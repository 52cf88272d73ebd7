use crate::context::CallContext;
use crate::metadata::MetadataMap;

/// A decoded request message together with the context of its call.
#[derive(Debug)]
pub struct Request<T> {
    message: T,
    context: CallContext,
}

impl<T> Request<T> {
    /// Wrap a message in a request served under `context`.
    pub fn new(message: T, context: CallContext) -> Self {
        Request { message, context }
    }

    /// Get a reference to the message.
    pub fn get_ref(&self) -> &T {
        &self.message
    }

    /// The metadata the caller sent with this call.
    pub fn metadata(&self) -> &MetadataMap {
        self.context.metadata()
    }

    /// The call's context: deadline, cancellation and metadata.
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Consume `self`, returning the message.
    pub fn into_inner(self) -> T {
        self.message
    }

    /// Consume `self`, returning the message and the call context.
    pub fn into_parts(self) -> (T, CallContext) {
        (self.message, self.context)
    }
}
