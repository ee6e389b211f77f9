use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use streamchat_model::{
    BackendError, ChatBackend, Conversation, ConversationId, ReplyStream,
};
use tracing::Instrument;

/// A type-erased backend error.
pub type BoxedError = Box<dyn BackendError>;

type BoxedFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, BoxedError>> + Send>>;
type OnFragment = Box<dyn Fn(String) + Send + 'static>;

trait BackendObject: Send + Sync + 'static {
    fn create_conversation(&self) -> BoxedFuture<Conversation>;

    fn list_conversations(&self) -> BoxedFuture<Vec<Conversation>>;

    fn remove_conversation(&self, id: &ConversationId) -> BoxedFuture<()>;

    fn send_chat_turn(
        &self,
        id: &ConversationId,
        text: &str,
        on_fragment: OnFragment,
    ) -> BoxedFuture<String>;
}

struct AnyBackend<B: ChatBackend>(B);

#[inline]
fn erase<E: BackendError>(err: E) -> BoxedError {
    Box::new(err)
}

impl<B: ChatBackend + 'static> BackendObject for AnyBackend<B> {
    #[inline]
    fn create_conversation(&self) -> BoxedFuture<Conversation> {
        let fut = self.0.create_conversation();
        Box::pin(async move { fut.await.map_err(erase) })
    }

    #[inline]
    fn list_conversations(&self) -> BoxedFuture<Vec<Conversation>> {
        let fut = self.0.list_conversations();
        Box::pin(async move { fut.await.map_err(erase) })
    }

    #[inline]
    fn remove_conversation(&self, id: &ConversationId) -> BoxedFuture<()> {
        let fut = self.0.remove_conversation(id);
        Box::pin(async move { fut.await.map_err(erase) })
    }

    fn send_chat_turn(
        &self,
        id: &ConversationId,
        text: &str,
        on_fragment: OnFragment,
    ) -> BoxedFuture<String> {
        let fut = self.0.send_chat_turn(id, text);
        Box::pin(
            async move {
                let reply = match fut.await {
                    Ok(reply) => reply,
                    Err(err) => {
                        error!("handshake failed: {err}");
                        return Err(erase(err));
                    }
                };
                stream_reply(reply, on_fragment).await
            }
            .instrument(trace_span!("chat turn req")),
        )
    }
}

async fn stream_reply<R: ReplyStream>(
    reply: R,
    on_fragment: OnFragment,
) -> Result<String, BoxedError> {
    let mut transcript = String::new();

    trace!("start receiving fragments");

    let mut pinned_reply = pin!(reply);
    loop {
        let fragment_or_err =
            poll_fn(|cx| pinned_reply.as_mut().poll_next_fragment(cx)).await;
        let fragment = match fragment_or_err {
            Ok(Some(fragment)) => fragment,
            Ok(None) => break,
            Err(err) => {
                error!("reply failed: {err}");
                return Err(erase(err));
            }
        };
        trace!("got a fragment: {fragment:?}");

        transcript.push_str(&fragment);
        on_fragment(fragment);
    }

    trace!("finished a reply");
    Ok(transcript)
}

/// A wrapper around a chat backend that provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub(crate) struct BackendClient {
    backend: Arc<dyn BackendObject>,
}

impl BackendClient {
    #[inline]
    pub fn new<B: ChatBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(AnyBackend(backend)),
        }
    }

    #[inline]
    pub async fn create_conversation(
        &self,
    ) -> Result<Conversation, BoxedError> {
        self.backend.create_conversation().await
    }

    #[inline]
    pub async fn list_conversations(
        &self,
    ) -> Result<Vec<Conversation>, BoxedError> {
        self.backend.list_conversations().await
    }

    #[inline]
    pub async fn remove_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<(), BoxedError> {
        self.backend.remove_conversation(id).await
    }

    /// Sends a chat turn and streams the reply, calling `on_fragment` for
    /// every fragment in arrival order. Returns the whole reply text.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The reply stops streaming further
    /// fragments when this operation is cancelled.
    #[inline]
    pub async fn send_chat_turn(
        &self,
        id: &ConversationId,
        text: &str,
        on_fragment: impl Fn(String) + Send + 'static,
    ) -> Result<String, BoxedError> {
        self.backend
            .send_chat_turn(id, text, Box::new(on_fragment))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use streamchat_model::ErrorKind;
    use streamchat_test_backend::{PresetEvent, PresetReply, TestBackend};

    use super::*;

    #[tokio::test]
    async fn test_send_chat_turn() {
        let backend = TestBackend::default();
        let id = backend.add_conversation(vec![]);
        for _ in 0..3 {
            backend.add_reply(PresetReply::with_fragments([
                "How ", "are ", "you?",
            ]));
        }

        let client = BackendClient::new(backend);

        for _ in 0..3 {
            let fragments = Arc::new(Mutex::new(Vec::new()));
            let transcript = client
                .send_chat_turn(&id, "Hi", {
                    let fragments = Arc::clone(&fragments);
                    move |fragment| fragments.lock().unwrap().push(fragment)
                })
                .await
                .unwrap();
            assert_eq!(transcript, "How are you?");
            assert_eq!(*fragments.lock().unwrap(), ["How ", "are ", "you?"]);
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let backend = TestBackend::default();
        let id = backend.add_conversation(vec![]);
        backend.add_reply(PresetReply::with_events([
            PresetEvent::Fragment("a".to_owned()),
            PresetEvent::NetworkError,
        ]));
        let client = BackendClient::new(backend);

        let err = client.send_chat_turn(&id, "Hi", |_| {}).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);

        // The script is exhausted, so the handshake fails.
        let err = client.send_chat_turn(&id, "Hi", |_| {}).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
