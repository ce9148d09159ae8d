//! Logging utilities with request context support.
//!
//! Each chat request runs inside a task-local scope carrying its request ID,
//! so adapter and pipeline logs can be correlated without threading the ID
//! through every call.

use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

tokio::task_local! {
    /// Task-local storage for the current request ID.
    pub static REQUEST_ID: String;
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A stream that re-enters the request context on every poll.
///
/// Response bodies are polled by the server after the handler future has
/// returned, outside any `scope`; this keeps the context attached to them.
pub struct ContextStream<S> {
    inner: S,
    request_id: String,
}

impl<S> ContextStream<S> {
    pub fn new(inner: S, request_id: String) -> Self {
        Self { inner, request_id }
    }
}

impl<S> Stream for ContextStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let inner = &mut this.inner;
        REQUEST_ID.sync_scope(this.request_id.clone(), || Pin::new(inner).poll_next(cx))
    }
}
