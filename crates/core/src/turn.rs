use streamchat_model::{ConversationId, ErrorKind};

/// The turn state of a single conversation.
///
/// A conversation moves from `Idle` to `Streaming` when a message is
/// sent, and from `Streaming` to `Idle` or `Errored` when the reply
/// terminates. `Errored` behaves like `Idle` for the next send, it only
/// records how the last turn ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TurnState {
    /// No reply is in flight.
    #[default]
    Idle,
    /// A reply is being streamed.
    Streaming,
    /// The last turn failed.
    Errored,
}

impl TurnState {
    /// Returns `true` if a reply is in flight.
    #[inline]
    pub fn is_streaming(self) -> bool {
        self == TurnState::Streaming
    }

    /// Enters the streaming state, returning `false` if a reply is
    /// already in flight.
    #[inline]
    pub(crate) fn begin(&mut self) -> bool {
        if self.is_streaming() {
            return false;
        }
        *self = TurnState::Streaming;
        true
    }

    #[inline]
    pub(crate) fn finish(&mut self) {
        debug_assert!(self.is_streaming());
        *self = TurnState::Idle;
    }

    #[inline]
    pub(crate) fn fail(&mut self) {
        debug_assert!(self.is_streaming());
        *self = TurnState::Errored;
    }
}

/// The result of asking the workspace to send a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SendOutcome {
    /// The message was appended and the turn started.
    Sent,
    /// A reply is still streaming in the active conversation, nothing
    /// was changed.
    Busy,
    /// The message is blank.
    Empty,
    /// No conversation is selected.
    NoActiveConversation,
}

/// Progress of a running turn, produced by its task and applied to the
/// workspace with [`crate::Workspace::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnEvent {
    /// The conversation that owns the turn.
    pub conversation_id: ConversationId,
    pub(crate) turn_id: u64,
    /// What happened.
    pub kind: TurnEventKind,
}

/// See [`TurnEvent`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnEventKind {
    /// A text fragment of the assistant reply arrived.
    Fragment(String),
    /// The reply completed.
    Finished,
    /// The turn failed.
    Failed(ErrorKind),
}
