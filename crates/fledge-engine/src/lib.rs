//! Fledge engine runtime.
//!
//! This crate hosts the engine side of the embedding bridge. Each
//! engine runs in its own OS thread with a current-thread tokio runtime
//! and a single FIFO command queue; the host talks to it exclusively
//! through [`EngineHandle`] and the [`EngineMessenger`] capability
//! derived from it.
//!
//! # Architecture
//!
//! - `spawn_engine` validates the creation descriptor synchronously and
//!   returns an owning handle; a rejected descriptor never produces a
//!   handle.
//! - Outbound messages (platform → guest) are matched against the
//!   guest-side channel handlers held by the worker; a channel with no
//!   guest handler replies empty, exactly once.
//! - Inbound messages (guest → platform) are pushed through the
//!   host-provided [`PlatformDispatcher`], always on the engine thread.
//! - Reply handles are one-shot: the first response consumes them.

mod command;
mod error;
mod handle;
mod spawn;
mod types;
mod worker;

pub use error::EngineError;
pub use handle::{EngineHandle, EngineMessenger};
pub use spawn::spawn_engine;
pub use types::{
    AppEvent, BinaryReply, DispatchError, EngineProperties, GuestHandler, PlatformDispatcher,
    PlatformMessage, ResponseHandle,
};
