//! Transcript state of a single conversation.

use streamchat_model::{Conversation, Message, Role};

/// The notice that replaces the reply of a failed turn.
pub const ERROR_NOTICE: &str = "Error: Unable to get a response from the \
    assistant. Please check that the backend is reachable and configured \
    correctly.";

/// The cached copy of a conversation, updated optimistically when a
/// message is sent and incrementally while the reply streams in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    conversation: Conversation,
    // Index where the assistant message of the running turn goes.
    turn_start: Option<usize>,
}

impl Transcript {
    /// Wraps a conversation received from the backend.
    #[inline]
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            turn_start: None,
        }
    }

    /// Returns the conversation.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns `true` if a turn has started and not terminated yet.
    #[inline]
    pub fn in_turn(&self) -> bool {
        self.turn_start.is_some()
    }

    /// Appends the user message and starts a turn.
    pub fn push_user_message(&mut self, text: &str) {
        debug_assert!(!self.in_turn());
        self.conversation.messages.push(Message::user(text));
        self.turn_start = Some(self.conversation.messages.len());
    }

    /// Extends the assistant message of the running turn, creating it on
    /// the first non-empty fragment.
    pub fn push_fragment(&mut self, fragment: &str) {
        let Some(turn_start) = self.turn_start else {
            warn!("fragment arrived outside of a turn");
            return;
        };
        if fragment.is_empty() {
            return;
        }
        let messages = &mut self.conversation.messages;
        if messages.len() == turn_start {
            messages.push(Message::assistant(""));
        }
        if let Some(last) = messages.last_mut() {
            debug_assert_eq!(last.role, Role::Assistant);
            last.content.push_str(fragment);
        }
    }

    /// Ends the running turn, keeping the reply as it is.
    #[inline]
    pub fn finish_turn(&mut self) {
        self.turn_start = None;
    }

    /// Ends the running turn with an error notice in place of whatever
    /// part of the reply arrived.
    pub fn fail_turn(&mut self, notice: &str) {
        let Some(turn_start) = self.turn_start.take() else {
            return;
        };
        let messages = &mut self.conversation.messages;
        messages.truncate(turn_start);
        messages.push(Message::assistant(notice));
    }
}
