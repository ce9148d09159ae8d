use crate::core::StreamCancelHandle;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream wrapper that triggers a cancellation handle when dropped.
///
/// The server drops the response body when the client goes away, which is
/// the only disconnect signal an NDJSON stream gets.
pub struct DisconnectStream<S> {
    pub stream: S,
    pub cancel_handle: StreamCancelHandle,
}

impl<S> DisconnectStream<S> {
    pub fn new(stream: S, cancel_handle: StreamCancelHandle) -> Self {
        Self {
            stream,
            cancel_handle,
        }
    }
}

impl<S> Stream for DisconnectStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        // A completed stream makes cancel() a no-op
        if !self.cancel_handle.is_completed() {
            tracing::debug!("Client disconnect detected - stream cancelled");
        }
        self.cancel_handle.cancel();
    }
}
