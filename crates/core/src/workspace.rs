
use streamchat_model::{ChatBackend, Conversation, ConversationId};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::backend_client::{BackendClient, BoxedError};
use crate::transcript::{ERROR_NOTICE, Transcript};
use crate::turn::{SendOutcome, TurnEvent, TurnEventKind, TurnState};

struct Entry {
    transcript: Transcript,
    turn_state: TurnState,
    running_turn: Option<RunningTurn>,
}

impl Entry {
    #[inline]
    fn new(conversation: Conversation) -> Self {
        Self {
            transcript: Transcript::new(conversation),
            turn_state: TurnState::default(),
            running_turn: None,
        }
    }

    #[inline]
    fn id(&self) -> &ConversationId {
        &self.transcript.conversation().id
    }

    fn abort_turn(&mut self) {
        if let Some(running_turn) = self.running_turn.take() {
            debug!("aborting turn {} of {}", running_turn.id, self.id());
            running_turn.task.abort();
        }
    }
}

struct RunningTurn {
    id: u64,
    task: JoinHandle<()>,
}

/// The receiving half of the turn events, see [`Workspace::new`].
#[derive(Debug)]
pub struct TurnEvents(mpsc::UnboundedReceiver<TurnEvent>);

impl TurnEvents {
    /// Receives the next event of any running turn.
    ///
    /// This method is cancel safe.
    #[inline]
    pub async fn recv(&mut self) -> Option<TurnEvent> {
        self.0.recv().await
    }
}

/// The state behind a chat front end: the list of conversations, the
/// active one, a pending delete confirmation, and the turn of each
/// conversation.
///
/// The workspace is owned by a single task. Replies are read by spawned
/// turn tasks, which report back through [`TurnEvents`]; the owner feeds
/// each event to [`Workspace::apply`], so every state change happens on
/// the owning task and in arrival order.
///
/// Switching to another conversation does not stop a running turn. Its
/// events keep updating the conversation the turn belongs to. Deleting a
/// conversation aborts its turn.
pub struct Workspace {
    client: BackendClient,
    entries: Vec<Entry>,
    active: Option<ConversationId>,
    pending_delete: Option<ConversationId>,
    next_turn_id: u64,
    events_tx: mpsc::UnboundedSender<TurnEvent>,
    runtime: Handle,
}

impl Workspace {
    /// Creates an empty workspace on top of a backend.
    ///
    /// Call [`Workspace::refresh`] to load the existing conversations.
    /// Turns and background deletes are spawned onto the runtime this is
    /// called from, so the other methods work outside of it as well.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new<B: ChatBackend + 'static>(backend: B) -> (Self, TurnEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let workspace = Self {
            client: BackendClient::new(backend),
            entries: vec![],
            active: None,
            pending_delete: None,
            next_turn_id: 1,
            events_tx,
            runtime: Handle::current(),
        };
        (workspace, TurnEvents(events_rx))
    }

    /// Returns the conversations, in backend order followed by the ones
    /// created since the last refresh.
    #[inline]
    pub fn conversations(
        &self,
    ) -> impl ExactSizeIterator<Item = &Conversation> {
        self.entries.iter().map(|e| e.transcript.conversation())
    }

    /// Returns a conversation by its id.
    #[inline]
    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.entry(id).map(|e| e.transcript.conversation())
    }

    /// Returns the id of the active conversation.
    #[inline]
    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    /// Returns the active conversation.
    #[inline]
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_ref().and_then(|id| self.conversation(id))
    }

    /// Returns the turn state of a conversation.
    #[inline]
    pub fn turn_state(&self, id: &ConversationId) -> Option<TurnState> {
        self.entry(id).map(|e| e.turn_state)
    }

    /// Reloads the conversation list from the backend.
    ///
    /// Cached copies are replaced, except conversations whose reply is
    /// still streaming, which keep their local state. Conversations that
    /// the backend no longer returns are dropped.
    pub async fn refresh(&mut self) -> Result<(), BoxedError> {
        let conversations = self.client.list_conversations().await?;
        debug!("loaded {} conversations", conversations.len());

        let mut previous = std::mem::take(&mut self.entries);
        for conversation in conversations {
            let streaming = previous.iter().position(|e| {
                e.id() == &conversation.id && e.turn_state.is_streaming()
            });
            let entry = match streaming {
                Some(idx) => previous.swap_remove(idx),
                None => Entry::new(conversation),
            };
            self.entries.push(entry);
        }
        for mut entry in previous {
            entry.abort_turn();
        }

        if self.active.as_ref().is_some_and(|id| self.entry(id).is_none()) {
            self.active = None;
        }
        let pending_gone = self
            .pending_delete
            .as_ref()
            .is_some_and(|id| self.entry(id).is_none());
        if pending_gone {
            self.pending_delete = None;
        }
        Ok(())
    }

    /// Creates a conversation on the backend, appends it to the list, and
    /// makes it active.
    pub async fn create_conversation(
        &mut self,
    ) -> Result<ConversationId, BoxedError> {
        let conversation = self.client.create_conversation().await?;
        let id = conversation.id.clone();
        info!("created conversation {id}");
        self.entries.push(Entry::new(conversation));
        self.active = Some(id.clone());
        Ok(id)
    }

    /// Makes a conversation active, returning `false` if it's unknown.
    pub fn select(&mut self, id: &ConversationId) -> bool {
        if self.entry(id).is_none() {
            return false;
        }
        self.active = Some(id.clone());
        true
    }

    /// Sends a message to the active conversation.
    ///
    /// The user message is appended before anything is sent, so it stays
    /// in the transcript even if the turn fails. The reply arrives later as
    /// [`TurnEvent`]s.
    pub fn send_message(&mut self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Empty;
        }
        let Some(id) = self.active.clone() else {
            return SendOutcome::NoActiveConversation;
        };
        let turn_id = self.next_turn_id;
        let Some(entry) = self.entry_mut(&id) else {
            return SendOutcome::NoActiveConversation;
        };
        if !entry.turn_state.begin() {
            debug!("rejecting a message, {id} is still streaming");
            return SendOutcome::Busy;
        }
        entry.transcript.push_user_message(text);
        self.next_turn_id += 1;

        let task = self.spawn_turn(id.clone(), turn_id, text.to_owned());
        if let Some(entry) = self.entry_mut(&id) {
            entry.running_turn = Some(RunningTurn { id: turn_id, task });
        }
        SendOutcome::Sent
    }

    fn spawn_turn(
        &self,
        conversation_id: ConversationId,
        turn_id: u64,
        text: String,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        let events_tx = self.events_tx.clone();
        let span =
            debug_span!("turn", conversation = %conversation_id, turn_id);
        self.runtime.spawn(
            async move {
                let on_fragment = {
                    let events_tx = events_tx.clone();
                    let conversation_id = conversation_id.clone();
                    move |fragment| {
                        events_tx
                            .send(TurnEvent {
                                conversation_id: conversation_id.clone(),
                                turn_id,
                                kind: TurnEventKind::Fragment(fragment),
                            })
                            .ok();
                    }
                };
                let kind = match client
                    .send_chat_turn(&conversation_id, &text, on_fragment)
                    .await
                {
                    Ok(transcript) => {
                        debug!("reply completed, {} bytes", transcript.len());
                        TurnEventKind::Finished
                    }
                    Err(err) => {
                        warn!("turn failed: {err}");
                        TurnEventKind::Failed(err.kind())
                    }
                };
                events_tx
                    .send(TurnEvent {
                        conversation_id,
                        turn_id,
                        kind,
                    })
                    .ok();
            }
            .instrument(span),
        )
    }

    /// Applies a turn event to the conversation it belongs to.
    ///
    /// Returns `false` if the event was dropped, because the conversation
    /// is gone or the turn is not the running one.
    pub fn apply(&mut self, event: &TurnEvent) -> bool {
        let Some(entry) = self.entry_mut(&event.conversation_id) else {
            debug!("dropping an event of unknown {}", event.conversation_id);
            return false;
        };
        let is_current = entry
            .running_turn
            .as_ref()
            .is_some_and(|t| t.id == event.turn_id);
        if !is_current {
            debug!("dropping an event of stale turn {}", event.turn_id);
            return false;
        }

        match &event.kind {
            TurnEventKind::Fragment(fragment) => {
                entry.transcript.push_fragment(fragment);
            }
            TurnEventKind::Finished => {
                entry.transcript.finish_turn();
                entry.turn_state.finish();
                entry.running_turn = None;
            }
            TurnEventKind::Failed(kind) => {
                info!("turn of {} failed: {kind}", event.conversation_id);
                entry.transcript.fail_turn(ERROR_NOTICE);
                entry.turn_state.fail();
                entry.running_turn = None;
            }
        }
        true
    }

    /// Asks for confirmation before deleting a conversation.
    ///
    /// Returns `false` if the conversation is unknown.
    pub fn request_delete(&mut self, id: &ConversationId) -> bool {
        if self.entry(id).is_none() {
            return false;
        }
        self.pending_delete = Some(id.clone());
        true
    }

    /// Returns the conversation waiting for a delete confirmation.
    #[inline]
    pub fn pending_delete(&self) -> Option<&Conversation> {
        self.pending_delete
            .as_ref()
            .and_then(|id| self.conversation(id))
    }

    /// Drops the pending delete request.
    #[inline]
    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Deletes the conversation waiting for confirmation.
    ///
    /// The conversation leaves the list right away and its running turn
    /// is aborted. The backend request is sent in the background, and a
    /// failure is only logged.
    pub fn confirm_delete(&mut self) -> Option<ConversationId> {
        let id = self.pending_delete.take()?;
        let idx = self.entries.iter().position(|e| e.id() == &id)?;
        let mut entry = self.entries.remove(idx);
        entry.abort_turn();
        if self.active.as_ref() == Some(&id) {
            self.active = None;
        }

        let client = self.client.clone();
        let remove_id = id.clone();
        self.runtime.spawn(async move {
            match client.remove_conversation(&remove_id).await {
                Ok(()) => debug!("removed conversation {remove_id}"),
                Err(err) => warn!("failed to remove {remove_id}: {err}"),
            }
        });
        Some(id)
    }

    #[inline]
    fn entry(&self, id: &ConversationId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    #[inline]
    fn entry_mut(&mut self, id: &ConversationId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id() == id)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        for entry in &mut self.entries {
            entry.abort_turn();
        }
    }
}
