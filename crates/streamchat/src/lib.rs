//! A terminal chat client for a conversation backend that streams its
//! replies.
//!
//! The crate includes a CLI tool for chatting in the terminal. The command
//! parser and the text rendering are also exposed as a library, so other
//! line-oriented front ends can reuse them.

#![deny(missing_docs)]

pub mod command;
pub mod view;

/// Re-exports of [`streamchat_core`] crate.
pub mod core {
    pub use streamchat_core::*;
}
