//! A local fake backend for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use streamchat_model::{
    BackendError, ChatBackend, Conversation, ConversationId, ErrorKind,
    Message, ReplyStream,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Error {
    #[inline]
    fn network(message: &'static str) -> Self {
        Self {
            message,
            kind: ErrorKind::Network,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[derive(Default)]
struct State {
    conversations: Vec<Conversation>,
    next_id: u64,
    script: VecDeque<PresetReply>,
    chat_requests: Vec<(ConversationId, String)>,
    removed: Vec<ConversationId>,
    offline: bool,
    delay: Option<Duration>,
}

pub struct TestReply {
    state: Arc<Mutex<State>>,
    conversation_id: ConversationId,
    events: VecDeque<PresetEvent>,
    transcript: String,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
    finished: bool,
}

impl TestReply {
    fn finish(&mut self) {
        self.finished = true;
        let mut state = lock(&self.state);
        if let Some(conversation) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == self.conversation_id)
        {
            conversation
                .messages
                .push(Message::assistant(self.transcript.clone()));
        }
    }
}

impl ReplyStream for TestReply {
    type Error = crate::Error;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.get_mut();
        if this.finished {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(this.delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        match this.events.pop_front() {
            Some(PresetEvent::Fragment(fragment)) => {
                this.transcript.push_str(&fragment);
                Poll::Ready(Ok(Some(fragment)))
            }
            Some(PresetEvent::NetworkError) => {
                this.finished = true;
                Poll::Ready(Err(Error::network("connection reset")))
            }
            Some(PresetEvent::MalformedFrame) => {
                this.finished = true;
                Poll::Ready(Err(Error {
                    message: "malformed frame",
                    kind: ErrorKind::StreamParse,
                }))
            }
            None => {
                this.finish();
                Poll::Ready(Ok(None))
            }
        }
    }
}

/// A local fake backend for testing purpose.
///
/// Before sending chat turns, you need to setup the reply script, which is
/// how the backend should answer each turn, in order. If there are no
/// enough replies in the script, the handshake fails with a network error.
///
/// Clones share the same state, so a test can keep one clone to inspect
/// what the code under test has sent.
#[derive(Clone, Default)]
pub struct TestBackend {
    state: Arc<Mutex<State>>,
}

impl TestBackend {
    /// Appends a reply to the script.
    #[inline]
    pub fn add_reply(&self, reply: PresetReply) {
        lock(&self.state).script.push_back(reply);
    }

    /// Seeds a stored conversation, as if it was created earlier.
    pub fn add_conversation(&self, messages: Vec<Message>) -> ConversationId {
        let mut state = lock(&self.state);
        let id = next_id(&mut state);
        let mut conversation = Conversation::new(id.clone(), 0);
        conversation.messages = messages;
        state.conversations.push(conversation);
        id
    }

    /// Sets the delay before each reply event.
    #[inline]
    pub fn set_delay(&self, duration: Duration) {
        lock(&self.state).delay = Some(duration);
    }

    /// Makes the conversation endpoints fail with network errors.
    #[inline]
    pub fn set_offline(&self, offline: bool) {
        lock(&self.state).offline = offline;
    }

    /// Returns every chat turn received so far.
    #[inline]
    pub fn chat_requests(&self) -> Vec<(ConversationId, String)> {
        lock(&self.state).chat_requests.clone()
    }

    /// Returns the ids of every remove request received so far.
    #[inline]
    pub fn removed(&self) -> Vec<ConversationId> {
        lock(&self.state).removed.clone()
    }

    /// Returns the stored copy of a conversation.
    #[inline]
    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        lock(&self.state)
            .conversations
            .iter()
            .find(|c| &c.id == id)
            .cloned()
    }
}

impl ChatBackend for TestBackend {
    type Error = crate::Error;
    type Reply = TestReply;

    fn create_conversation(
        &self,
    ) -> impl Future<Output = Result<Conversation, Self::Error>> + Send + 'static
    {
        let mut state = lock(&self.state);
        let result = if state.offline {
            Err(Error::network("backend is offline"))
        } else {
            let id = next_id(&mut state);
            let created_at = state.next_id as i64;
            let conversation = Conversation::new(id, created_at);
            state.conversations.push(conversation.clone());
            Ok(conversation)
        };
        ready(result)
    }

    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, Self::Error>>
    + Send
    + 'static {
        let state = lock(&self.state);
        let result = if state.offline {
            Err(Error::network("backend is offline"))
        } else {
            Ok(state.conversations.clone())
        };
        ready(result)
    }

    fn remove_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let mut state = lock(&self.state);
        state.removed.push(id.clone());
        let result = if state.offline {
            Err(Error::network("backend is offline"))
        } else {
            state.conversations.retain(|c| &c.id != id);
            Ok(())
        };
        ready(result)
    }

    fn send_chat_turn(
        &self,
        id: &ConversationId,
        text: &str,
    ) -> impl Future<Output = Result<Self::Reply, Self::Error>> + Send + 'static
    {
        let mut state = lock(&self.state);
        state.chat_requests.push((id.clone(), text.to_owned()));

        let result = match state.script.pop_front() {
            None => Err(Error::network("no enough replies")),
            Some(reply) if reply.rejected => {
                Err(Error::network("handshake rejected"))
            }
            Some(reply) => {
                if let Some(conversation) =
                    state.conversations.iter_mut().find(|c| &c.id == id)
                {
                    conversation.messages.push(Message::user(text));
                }
                Ok(TestReply {
                    state: Arc::clone(&self.state),
                    conversation_id: id.clone(),
                    events: reply.events.into(),
                    transcript: String::new(),
                    delay: state.delay.unwrap_or(Duration::from_millis(1)),
                    sleep: None,
                    finished: false,
                })
            }
        };
        ready(result)
    }
}

#[inline]
fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // A panicking test thread may poison the lock, the state is still
    // usable for the remaining assertions.
    state.lock().unwrap_or_else(|err| err.into_inner())
}

fn next_id(state: &mut State) -> ConversationId {
    state.next_id += 1;
    ConversationId::new(format!("conv-{}", state.next_id))
}

impl Debug for TestBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("TestBackend")
            .field("conversations", &state.conversations.len())
            .field("script", &state.script.len())
            .finish_non_exhaustive()
    }
}
