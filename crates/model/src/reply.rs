use std::pin::Pin;
use std::task::{self, Poll};

use crate::backend::BackendError;

/// A streamed assistant reply.
pub trait ReplyStream: Sized + Send + 'static {
    /// The error type that may be returned while streaming.
    type Error: BackendError;

    /// Attempts to pull out the next text fragment from the reply.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct reply state:
    ///
    /// - `Poll::Pending` means that this reply is still waiting for the
    ///   next fragment. Implementations will ensure that the current task
    ///   will be notified when the next fragment may be ready.
    /// - `Poll::Ready(Ok(Some(fragment)))` means the reply has a fragment
    ///   to deliver, and may produce further fragments on subsequent
    ///   `poll_next_fragment` calls.
    /// - `Poll::Ready(Ok(None))` means the reply has completed, either
    ///   because the backend sent the termination sentinel or because the
    ///   transport ended.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   processing the reply. No more fragments will be produced.
    ///
    /// Calling this method after completion or failure should always
    /// return `None`.
    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>>;
}
