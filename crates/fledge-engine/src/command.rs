//! Commands sent to the engine worker thread.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::types::{AppEvent, BinaryReply, GuestHandler};

/// Messages processed by the worker loop, in FIFO order.
pub(crate) enum EngineCommand {
    /// Start executing the configured entrypoint.
    Run {
        reply: oneshot::Sender<Result<(), String>>,
    },

    /// Forward an application lifecycle event.
    Notify { event: AppEvent },

    /// Deliver an outbound message to the guest side of a channel.
    ///
    /// When `reply` is present it is invoked exactly once, with the
    /// guest response or `None` if the channel has no guest handler.
    Send {
        channel: String,
        payload: Bytes,
        reply: Option<BinaryReply>,
    },

    /// Install a guest-side handler for a channel (replaces any prior one).
    SetGuestHandler {
        channel: String,
        handler: GuestHandler,
    },

    /// Remove the guest-side handler for a channel.
    ClearGuestHandler { channel: String },

    /// Inject a guest-originated message toward the platform side.
    Inject {
        channel: String,
        payload: Bytes,
        reply: Option<oneshot::Sender<Option<Bytes>>>,
    },

    /// Report the lifecycle events delivered so far.
    InspectEvents {
        reply: oneshot::Sender<Vec<AppEvent>>,
    },

    /// Stop the worker loop.
    Shutdown,
}
