//! Shared vocabulary between chat front ends and chat backends.
//!
//! This crate establishes the data model of a conversation and the
//! protocol a backend has to speak, so that the front end can work
//! against the HTTP backend, a scripted test backend, or anything else
//! without modifying the core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod backend;
mod conversation;
mod error;
mod reply;

pub use backend::*;
pub use conversation::*;
pub use error::*;
pub use reply::*;
