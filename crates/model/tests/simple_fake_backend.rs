use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use streamchat_model::{
    BackendError, ChatBackend, Conversation, ConversationId, ErrorKind,
    ReplyStream,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct FakeBackendError(ErrorKind);

impl Display for FakeBackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FakeBackendError {}

impl BackendError for FakeBackendError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Echoes the user message back, one word per fragment.
#[derive(Debug)]
struct EchoReply {
    words: VecDeque<String>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl EchoReply {
    fn new(input: &str) -> Self {
        let words = format!("You said {input}")
            .split(' ')
            .map(ToString::to_string)
            .collect();
        Self { words, sleep: None }
    }
}

impl ReplyStream for EchoReply {
    type Error = FakeBackendError;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.get_mut();
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            if let Some(mut word) = this.words.pop_front() {
                if !this.words.is_empty() {
                    word.push(' ');
                }
                return Poll::Ready(Ok(Some(word)));
            }
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_fragment(cx)
    }
}

struct EchoBackend;

impl ChatBackend for EchoBackend {
    type Error = FakeBackendError;
    type Reply = EchoReply;

    fn create_conversation(
        &self,
    ) -> impl Future<Output = Result<Conversation, Self::Error>> + Send + 'static
    {
        ready(Ok(Conversation::new(ConversationId::new("echo"), 0)))
    }

    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, Self::Error>>
    + Send
    + 'static {
        ready(Ok(vec![]))
    }

    fn remove_conversation(
        &self,
        _id: &ConversationId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        ready(Err(FakeBackendError(ErrorKind::Network)))
    }

    fn send_chat_turn(
        &self,
        _id: &ConversationId,
        text: &str,
    ) -> impl Future<Output = Result<Self::Reply, Self::Error>> + Send + 'static
    {
        let result = if text.is_empty() {
            Err(FakeBackendError(ErrorKind::Network))
        } else {
            Ok(EchoReply::new(text))
        };
        ready(result)
    }
}

mod tests {
    use std::future::poll_fn;

    use super::*;

    #[tokio::test]
    async fn test_streamed_reply() {
        let backend = EchoBackend;
        let conversation = backend.create_conversation().await.unwrap();
        let mut reply = backend
            .send_chat_turn(&conversation.id, "Good morning")
            .await
            .unwrap();

        let mut text = String::new();
        loop {
            let next =
                poll_fn(|cx| Pin::new(&mut reply).poll_next_fragment(cx));
            match next.await {
                Ok(Some(fragment)) => text.push_str(&fragment),
                Ok(None) => break,
                Err(err) => unreachable!("unexpected error: {err:?}"),
            }
        }

        assert_eq!(text, "You said Good morning");
    }

    #[tokio::test]
    async fn test_error() {
        let backend = EchoBackend;
        let id = ConversationId::new("echo");
        let err = backend.send_chat_turn(&id, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);

        let err = backend.remove_conversation(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
