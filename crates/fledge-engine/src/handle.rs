//! Engine handle and messenger capability.
//!
//! `EngineHandle` is the owning token for a spawned engine: it carries
//! the validity flag that every dependent operation checks, and joins
//! the worker thread on shutdown. `EngineMessenger` is the cloneable
//! messenger capability obtained from a handle; it can outlive no
//! operation past the handle's invalidation because it shares the same
//! validity flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::command::EngineCommand;
use crate::error::EngineError;
use crate::types::{AppEvent, BinaryReply, GuestHandler};

/// Handle to a spawned engine.
///
/// This is a lightweight owning token; all engine state lives in the
/// worker thread. The handle is invalidated exactly once by
/// [`shutdown`](EngineHandle::shutdown) (or on drop).
pub struct EngineHandle {
    /// Send commands to the worker thread.
    pub(crate) cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    /// Validity flag shared with every derived messenger.
    pub(crate) valid: Arc<AtomicBool>,
    /// Generation counter distinguishing this engine from any other.
    pub(crate) generation: u64,
    /// Worker thread join handle.
    pub(crate) thread_handle: std::sync::Mutex<Option<thread::JoinHandle<Result<(), EngineError>>>>,
}

impl EngineHandle {
    /// Whether the handle still refers to a live engine.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// The generation counter assigned at spawn.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Obtain the messenger capability for this engine.
    pub fn messenger(&self) -> EngineMessenger {
        EngineMessenger {
            cmd_tx: self.cmd_tx.clone(),
            valid: self.valid.clone(),
        }
    }

    fn send_command(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        if !self.is_valid() {
            return Err(EngineError::Terminated);
        }
        self.cmd_tx
            .send(cmd)
            .map_err(|_| EngineError::ChannelClosed)
    }

    /// Start executing the configured entrypoint.
    pub async fn run(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(EngineCommand::Run { reply: reply_tx })?;
        reply_rx
            .await
            .map_err(|_| EngineError::ChannelClosed)?
            .map_err(EngineError::LaunchFailed)
    }

    /// Forward an application lifecycle event to the engine.
    ///
    /// Fire-and-forget; the event payload is delivered verbatim.
    pub fn notify(&self, event: AppEvent) -> Result<(), EngineError> {
        self.send_command(EngineCommand::Notify { event })
    }

    /// Install a guest-side handler for a channel, replacing any prior
    /// handler. This plays the role of in-engine code listening on the
    /// channel.
    pub fn set_guest_handler(
        &self,
        channel: impl Into<String>,
        handler: GuestHandler,
    ) -> Result<(), EngineError> {
        self.send_command(EngineCommand::SetGuestHandler {
            channel: channel.into(),
            handler,
        })
    }

    /// Remove the guest-side handler for a channel.
    pub fn clear_guest_handler(&self, channel: impl Into<String>) -> Result<(), EngineError> {
        self.send_command(EngineCommand::ClearGuestHandler {
            channel: channel.into(),
        })
    }

    /// Inject a guest-originated fire-and-forget message toward the
    /// platform side.
    pub fn inject_message(
        &self,
        channel: impl Into<String>,
        payload: Bytes,
    ) -> Result<(), EngineError> {
        self.send_command(EngineCommand::Inject {
            channel: channel.into(),
            payload,
            reply: None,
        })
    }

    /// Inject a guest-originated message that expects a reply. The
    /// returned receiver resolves with the platform response, or `None`
    /// when the platform produced an empty response.
    pub fn inject_message_with_reply(
        &self,
        channel: impl Into<String>,
        payload: Bytes,
    ) -> Result<oneshot::Receiver<Option<Bytes>>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(EngineCommand::Inject {
            channel: channel.into(),
            payload,
            reply: Some(reply_tx),
        })?;
        Ok(reply_rx)
    }

    /// Report the lifecycle events the engine has received so far.
    pub async fn notified_events(&self) -> Result<Vec<AppEvent>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(EngineCommand::InspectEvents { reply: reply_tx })?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Invalidate the handle and stop the worker thread.
    ///
    /// Idempotent at this level; callers enforcing single-shutdown
    /// semantics do so above this handle.
    pub fn shutdown(&self) {
        if !self.valid.swap(false, Ordering::SeqCst) {
            return; // Already shut down
        }
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
        if let Some(handle) = self.thread_handle.lock().unwrap().take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("engine worker exited with error: {e}"),
                Err(_) => tracing::error!("engine worker thread panicked"),
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("generation", &self.generation)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Cloneable messenger capability for an engine.
///
/// Sends report transport acceptance only: `true` means the engine
/// accepted the message for delivery, not that a peer handled it.
#[derive(Clone)]
pub struct EngineMessenger {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    valid: Arc<AtomicBool>,
}

impl EngineMessenger {
    /// Whether the underlying engine is still live.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Fire-and-forget send toward the guest side.
    pub fn send(&self, channel: &str, payload: Bytes) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.cmd_tx
            .send(EngineCommand::Send {
                channel: channel.to_owned(),
                payload,
                reply: None,
            })
            .is_ok()
    }

    /// Send toward the guest side and request a reply.
    ///
    /// When the transport accepts the send (`true`), `reply` is invoked
    /// exactly once on the engine thread. When it does not (`false`),
    /// `reply` is dropped uninvoked.
    pub fn send_with_reply(&self, channel: &str, payload: Bytes, reply: BinaryReply) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.cmd_tx
            .send(EngineCommand::Send {
                channel: channel.to_owned(),
                payload,
                reply: Some(reply),
            })
            .is_ok()
    }
}

impl std::fmt::Debug for EngineMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMessenger")
            .field("valid", &self.is_valid())
            .finish()
    }
}
