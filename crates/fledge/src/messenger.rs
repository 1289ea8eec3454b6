//! Binary messenger - the channel-based message bus between plugins and
//! the engine.
//!
//! One messenger exists per engine. Each named channel carries at most
//! one handler; registering a handler on an occupied channel silently
//! replaces the previous one (last-writer-wins). Inbound dispatch runs
//! on the engine callback thread, so handlers must not assume they are
//! on the application's main thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;

use fledge_engine::{
    BinaryReply, DispatchError, EngineMessenger, PlatformDispatcher, PlatformMessage,
    ResponseHandle,
};

use crate::error::MessengerError;

/// Handler for inbound binary messages on one channel.
///
/// The reply handle is present when the sender expects a response; it
/// may be moved to another thread and completed later via
/// [`BinaryMessenger::send_response`].
pub type BinaryHandler = Arc<dyn Fn(&[u8], Option<ReplyHandle>) + Send + Sync + 'static>;

/// One-shot reply token handed to channel handlers.
///
/// Cloning shares the same underlying token; a response through any
/// clone consumes all of them.
#[derive(Clone)]
pub struct ReplyHandle {
    response: Arc<ResponseHandle>,
}

impl ReplyHandle {
    fn new(response: ResponseHandle) -> Self {
        Self {
            response: Arc::new(response),
        }
    }

    /// The channel the originating message was sent on.
    pub fn channel(&self) -> &str {
        self.response.channel()
    }

    /// Whether a response has already been sent for this token.
    pub fn is_consumed(&self) -> bool {
        self.response.is_consumed()
    }
}

impl std::fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("channel", &self.channel())
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

struct HandlerEntry {
    handler: BinaryHandler,
    /// Registration counter captured at `set_message_handler` time and
    /// checked again at dispatch time, so a handler is never invoked
    /// after it has been replaced or removed.
    registration: u64,
}

/// Per-engine channel registry and reply bookkeeping.
pub struct BinaryMessenger {
    handlers: DashMap<String, HandlerEntry>,
    registrations: AtomicU64,
    torn_down: AtomicBool,
    transport: RwLock<Option<EngineMessenger>>,
}

impl BinaryMessenger {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            registrations: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
            transport: RwLock::new(None),
        }
    }

    /// Attach the engine transport. Called once by the lifecycle
    /// controller after the engine has been created.
    pub(crate) fn attach(&self, transport: EngineMessenger) {
        *self.transport.write() = Some(transport);
    }

    /// Whether the messenger is attached to a live engine.
    pub fn is_live(&self) -> bool {
        !self.torn_down.load(Ordering::SeqCst)
            && self
                .transport
                .read()
                .as_ref()
                .is_some_and(|t| t.is_valid())
    }

    /// Fire-and-forget send toward the engine.
    ///
    /// Returns whether the transport accepted the send, not whether a
    /// peer handled it.
    pub fn send(&self, channel: &str, payload: Bytes) -> bool {
        if self.torn_down.load(Ordering::SeqCst) {
            return false;
        }
        match self.transport.read().as_ref() {
            Some(transport) => transport.send(channel, payload),
            None => false,
        }
    }

    /// Send toward the engine and request a reply.
    ///
    /// When the transport accepts the send (`true`), `reply` is invoked
    /// exactly once, asynchronously, on the engine callback thread - with
    /// `None` if the remote side has no handler for the channel. When
    /// the transport rejects the send (`false`), `reply` is dropped
    /// uninvoked.
    pub fn send_with_reply(
        &self,
        channel: &str,
        payload: Bytes,
        reply: impl FnOnce(Option<Bytes>) + Send + 'static,
    ) -> bool {
        if self.torn_down.load(Ordering::SeqCst) {
            return false;
        }
        let reply: BinaryReply = Box::new(reply);
        match self.transport.read().as_ref() {
            Some(transport) => transport.send_with_reply(channel, payload, reply),
            None => false,
        }
    }

    /// Register the handler for a channel, replacing any prior handler.
    pub fn set_message_handler(
        &self,
        channel: impl Into<String>,
        handler: impl Fn(&[u8], Option<ReplyHandle>) + Send + Sync + 'static,
    ) {
        let channel = channel.into();
        if self.torn_down.load(Ordering::SeqCst) {
            tracing::warn!(%channel, "handler registered after messenger teardown; ignoring");
            return;
        }
        let registration = self.registrations.fetch_add(1, Ordering::SeqCst) + 1;
        self.handlers.insert(
            channel,
            HandlerEntry {
                handler: Arc::new(handler),
                registration,
            },
        );
    }

    /// Deregister the handler for a channel, if any.
    pub fn clear_message_handler(&self, channel: &str) {
        self.handlers.remove(channel);
    }

    /// Send the response for an inbound message.
    ///
    /// At most one response may be sent per reply token; a second call,
    /// or a call with an already-consumed token, fails with
    /// [`MessengerError::ResponseAlreadySent`] and nothing is forwarded
    /// to the engine.
    pub fn send_response(
        &self,
        reply: &ReplyHandle,
        data: Option<Bytes>,
    ) -> Result<(), MessengerError> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(MessengerError::EngineShutDown);
        }
        if !reply.response.respond(data) {
            return Err(MessengerError::ResponseAlreadySent(
                reply.channel().to_owned(),
            ));
        }
        Ok(())
    }

    /// Tear the messenger down: drop all handlers and detach the
    /// transport. Called by the lifecycle controller during shutdown,
    /// after the plugin registry has been cleared and before the engine
    /// handle is invalidated.
    pub(crate) fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.handlers.clear();
        *self.transport.write() = None;
        tracing::debug!("messenger torn down");
    }

    fn respond_empty(reply: &Option<ReplyHandle>) {
        if let Some(reply) = reply {
            reply.response.respond(None);
        }
    }
}

impl Default for BinaryMessenger {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformDispatcher for BinaryMessenger {
    /// Deliver an inbound message to the channel's registered handler.
    ///
    /// Runs on the engine callback thread. Every path completes the
    /// reply token: missing handler, teardown, and stale-registration
    /// races all produce an empty response so the remote callback still
    /// fires exactly once.
    fn dispatch(&self, message: PlatformMessage) -> Result<(), DispatchError> {
        let PlatformMessage {
            channel,
            payload,
            response,
        } = message;
        let reply = response.map(ReplyHandle::new);

        if self.torn_down.load(Ordering::SeqCst) {
            Self::respond_empty(&reply);
            return Err(DispatchError::ShutDown);
        }

        let Some((handler, registration)) = self
            .handlers
            .get(&channel)
            .map(|entry| (entry.handler.clone(), entry.registration))
        else {
            tracing::warn!(%channel, "message received for channel with no handler");
            Self::respond_empty(&reply);
            return Err(DispatchError::MissingHandler(channel));
        };

        // Registration check at dispatch time: the handler must not run
        // if it was replaced or removed, or the messenger torn down,
        // between the lookup above and this point.
        let current = !self.torn_down.load(Ordering::SeqCst)
            && self
                .handlers
                .get(&channel)
                .map(|entry| entry.registration)
                == Some(registration);
        if !current {
            tracing::warn!(%channel, "handler changed during dispatch; dropping message");
            Self::respond_empty(&reply);
            return Ok(());
        }

        handler(&payload, reply);
        Ok(())
    }
}

impl std::fmt::Debug for BinaryMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryMessenger")
            .field("channels", &self.handlers.len())
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fledge_engine::{EngineHandle, EngineProperties, spawn_engine};
    use parking_lot::Mutex;
    use std::sync::mpsc;

    fn spawn_with_messenger() -> (EngineHandle, Arc<BinaryMessenger>) {
        let messenger = Arc::new(BinaryMessenger::new());
        let properties = EngineProperties {
            assets_path: "app/flutter_assets".into(),
            icu_data_path: "app/icudtl.dat".into(),
            ..Default::default()
        };
        let handle = spawn_engine(properties, messenger.clone()).unwrap();
        messenger.attach(handle.messenger());
        (handle, messenger)
    }

    #[tokio::test]
    async fn handler_replacement_is_last_writer_wins() {
        let (handle, messenger) = spawn_with_messenger();

        let first = Arc::new(Mutex::new(Vec::<Bytes>::new()));
        let second = Arc::new(Mutex::new(Vec::<Bytes>::new()));

        let sink = first.clone();
        messenger.set_message_handler("app/channel", move |payload, _| {
            sink.lock().push(Bytes::copy_from_slice(payload));
        });
        let sink = second.clone();
        messenger.set_message_handler("app/channel", move |payload, _| {
            sink.lock().push(Bytes::copy_from_slice(payload));
        });

        handle
            .inject_message("app/channel", Bytes::from_static(b"m1"))
            .unwrap();
        // A replied message flushes the FIFO queue behind the plain one.
        let rx = handle
            .inject_message_with_reply("app/channel", Bytes::from_static(b"m2"))
            .unwrap();
        let _ = rx.await;

        assert!(first.lock().is_empty());
        assert_eq!(
            *second.lock(),
            vec![Bytes::from_static(b"m1"), Bytes::from_static(b"m2")]
        );
        handle.shutdown();
    }

    #[tokio::test]
    async fn missing_handler_gets_empty_response() {
        let (handle, _messenger) = spawn_with_messenger();
        let rx = handle
            .inject_message_with_reply("no/such/channel", Bytes::from_static(b"req"))
            .unwrap();
        assert_eq!(rx.await.unwrap(), None);
        handle.shutdown();
    }

    #[tokio::test]
    async fn double_response_is_rejected() {
        let (handle, messenger) = spawn_with_messenger();

        let (tx, rx) = mpsc::channel();
        let messenger_in_handler = messenger.clone();
        messenger.set_message_handler("one/shot", move |_, reply| {
            let reply = reply.expect("sender requested a reply");
            let first = messenger_in_handler.send_response(&reply, Some(Bytes::from_static(b"r1")));
            let second =
                messenger_in_handler.send_response(&reply, Some(Bytes::from_static(b"r2")));
            tx.send((first.is_ok(), second)).unwrap();
        });

        let reply_rx = handle
            .inject_message_with_reply("one/shot", Bytes::from_static(b"req"))
            .unwrap();

        // Exactly one response reaches the engine side.
        assert_eq!(reply_rx.await.unwrap(), Some(Bytes::from_static(b"r1")));

        let (first_ok, second) = rx.recv().unwrap();
        assert!(first_ok);
        assert!(matches!(
            second,
            Err(MessengerError::ResponseAlreadySent(channel)) if channel == "one/shot"
        ));
        handle.shutdown();
    }

    #[tokio::test]
    async fn deferred_response_from_another_thread() {
        let (handle, messenger) = spawn_with_messenger();

        let messenger_in_handler = messenger.clone();
        messenger.set_message_handler("deferred", move |payload, reply| {
            let reply = reply.expect("sender requested a reply");
            let echoed = Bytes::copy_from_slice(payload);
            let messenger = messenger_in_handler.clone();
            std::thread::spawn(move || {
                messenger.send_response(&reply, Some(echoed)).unwrap();
            });
        });

        let rx = handle
            .inject_message_with_reply("deferred", Bytes::from_static(b"later"))
            .unwrap();
        assert_eq!(rx.await.unwrap(), Some(Bytes::from_static(b"later")));
        handle.shutdown();
    }

    #[tokio::test]
    async fn per_channel_delivery_is_fifo() {
        let (handle, messenger) = spawn_with_messenger();

        let seen = Arc::new(Mutex::new(Vec::<Bytes>::new()));
        let sink = seen.clone();
        messenger.set_message_handler("ordered", move |payload, _| {
            sink.lock().push(Bytes::copy_from_slice(payload));
        });

        for i in 0u8..10 {
            handle
                .inject_message("ordered", Bytes::copy_from_slice(&[i]))
                .unwrap();
        }
        let rx = handle
            .inject_message_with_reply("ordered", Bytes::from_static(b"flush"))
            .unwrap();
        let _ = rx.await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 11);
        for (i, payload) in seen.iter().take(10).enumerate() {
            assert_eq!(payload.as_ref(), &[i as u8]);
        }
        handle.shutdown();
    }

    #[tokio::test]
    async fn teardown_stops_dispatch_and_sends() {
        let (handle, messenger) = spawn_with_messenger();

        let seen = Arc::new(Mutex::new(0u32));
        let sink = seen.clone();
        messenger.set_message_handler("ch", move |_, _| {
            *sink.lock() += 1;
        });

        messenger.teardown();

        assert!(!messenger.send("ch", Bytes::from_static(b"x")));
        assert!(!messenger.is_live());

        // Inbound messages after teardown never reach the old handler,
        // and the remote reply still fires exactly once (empty).
        let rx = handle
            .inject_message_with_reply("ch", Bytes::from_static(b"y"))
            .unwrap();
        assert_eq!(rx.await.unwrap(), None);
        assert_eq!(*seen.lock(), 0);
        handle.shutdown();
    }

    #[tokio::test]
    async fn send_reaches_guest_side() {
        let (handle, messenger) = spawn_with_messenger();

        let (tx, rx) = mpsc::channel::<Bytes>();
        handle
            .set_guest_handler(
                "to/guest",
                Box::new(move |payload| {
                    tx.send(Bytes::copy_from_slice(payload)).unwrap();
                    None
                }),
            )
            .unwrap();

        assert!(messenger.send("to/guest", Bytes::from_static(b"hi")));
        assert_eq!(rx.recv().unwrap(), Bytes::from_static(b"hi"));
        handle.shutdown();
    }
}
