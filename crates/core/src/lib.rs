//! Core logic of the chat client: transcript state, the turn state
//! machine, and the workspace that ties conversations to a backend.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod backend_client;
pub mod transcript;
mod turn;
mod workspace;

pub use backend_client::BoxedError;
pub use transcript::{ERROR_NOTICE, Transcript};
pub use turn::{SendOutcome, TurnEvent, TurnEventKind, TurnState};
pub use workspace::{TurnEvents, Workspace};

/// Re-exports of [`streamchat_model`] crate.
pub mod model {
    pub use streamchat_model::*;
}
