use std::error::Error;

use crate::conversation::{Conversation, ConversationId};
use crate::error::ErrorKind;
use crate::reply::ReplyStream;

/// The error type for a chat backend.
pub trait BackendError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a chat backend, which stores conversations and
/// answers chat turns with a streamed reply.
///
/// Once the backend is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the backend should be prepared for being dropped anytime.
///
/// Every returned future must be fully independent of `self`.
pub trait ChatBackend: Send + Sync {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// The reply stream type for this backend.
    type Reply: ReplyStream<Error = Self::Error>;

    /// Creates a new conversation with no messages.
    fn create_conversation(
        &self,
    ) -> impl Future<Output = Result<Conversation, Self::Error>> + Send + 'static;

    /// Lists all conversations, in the order the backend returns them.
    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, Self::Error>>
    + Send
    + 'static;

    /// Removes a conversation.
    fn remove_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static;

    /// Sends a user message to a conversation and opens the reply stream.
    ///
    /// The future resolves as soon as the handshake is done, the reply
    /// itself is pulled from the returned stream.
    fn send_chat_turn(
        &self,
        id: &ConversationId,
        text: &str,
    ) -> impl Future<Output = Result<Self::Reply, Self::Error>> + Send + 'static;
}
