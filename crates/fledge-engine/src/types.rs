//! Engine ABI surface types.
//!
//! These types mirror the contract a native engine library would expose:
//! a creation descriptor, an application event set, a message descriptor,
//! and a one-shot response handle.

use std::path::PathBuf;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Engine creation descriptor.
///
/// `entrypoint` may be empty, in which case the engine runs the default
/// `main` entrypoint.
#[derive(Debug, Clone, Default)]
pub struct EngineProperties {
    /// Path to the bundled application assets.
    pub assets_path: PathBuf,
    /// Path to the ICU data file.
    pub icu_data_path: PathBuf,
    /// Path to the AOT snapshot library.
    pub aot_library_path: PathBuf,
    /// Switches passed to the engine at creation.
    pub switches: Vec<String>,
    /// Optional Dart entrypoint name.
    pub entrypoint: String,
    /// Arguments passed to the entrypoint.
    pub entrypoint_args: Vec<String>,
}

/// Application lifecycle events forwarded into the engine.
///
/// Payloads are delivered verbatim; the engine never inspects or rewrites
/// the app-control bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// An app-control request was received by the host framework.
    AppControlReceived(Bytes),
    /// The platform reported memory pressure.
    LowMemory,
    /// The system locale changed.
    LocaleChanged,
    /// The region format changed.
    RegionFormatChanged,
    /// The application moved to the foreground.
    Resumed,
    /// The application moved to the background.
    Paused,
}

/// One-shot reply callback for an outgoing message.
///
/// Invoked exactly once on the engine callback thread with the remote
/// response, or `None` when no remote handler is installed on the channel.
pub type BinaryReply = Box<dyn FnOnce(Option<Bytes>) + Send + 'static>;

/// A guest-side (in-engine) channel handler.
///
/// Returns the response payload, or `None` for no response.
pub type GuestHandler = Box<dyn FnMut(&[u8]) -> Option<Bytes> + Send + 'static>;

/// An inbound message delivered from the engine to the host.
pub struct PlatformMessage {
    /// Channel the message was sent on.
    pub channel: String,
    /// Message payload.
    pub payload: Bytes,
    /// Response handle, present when the sender expects a reply.
    pub response: Option<ResponseHandle>,
}

impl std::fmt::Debug for PlatformMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformMessage")
            .field("channel", &self.channel)
            .field("payload_len", &self.payload.len())
            .field("wants_reply", &self.response.is_some())
            .finish()
    }
}

/// One-shot capability authorizing exactly one response to an inbound
/// message.
///
/// The engine frees the underlying slot on the first `respond` call;
/// later calls are rejected.
pub struct ResponseHandle {
    channel: String,
    slot: Mutex<Option<oneshot::Sender<Option<Bytes>>>>,
}

impl ResponseHandle {
    pub(crate) fn new(channel: String, tx: oneshot::Sender<Option<Bytes>>) -> Self {
        Self {
            channel,
            slot: Mutex::new(Some(tx)),
        }
    }

    /// The channel this response belongs to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the response has already been sent.
    pub fn is_consumed(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Send the response. Returns `false` if the handle was already
    /// consumed; the duplicate response is dropped, never delivered.
    pub fn respond(&self, data: Option<Bytes>) -> bool {
        let Some(tx) = self.slot.lock().take() else {
            return false;
        };
        // The remote side may have given up waiting; a dropped receiver
        // still counts as a consumed handle.
        let _ = tx.send(data);
        true
    }
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("channel", &self.channel)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// Host-side sink for inbound messages.
///
/// The engine worker calls this on its own thread for every message the
/// guest sends toward the platform. Implementations must complete the
/// response handle (possibly with `None`) on every path.
pub trait PlatformDispatcher: Send + Sync + 'static {
    fn dispatch(&self, message: PlatformMessage) -> Result<(), DispatchError>;
}

/// Errors surfaced by a [`PlatformDispatcher`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handler is registered for the channel on the host side.
    #[error("no handler registered for channel '{0}'")]
    MissingHandler(String),

    /// The host messenger has been torn down.
    #[error("messenger has been torn down")]
    ShutDown,
}
