//! Worker loop for the engine thread.
//!
//! All engine state (run flag, guest channel handlers, delivered
//! events) lives here; the handle only holds the command sender. The
//! single command queue gives per-channel FIFO delivery for free.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::command::EngineCommand;
use crate::error::EngineError;
use crate::types::{
    AppEvent, EngineProperties, GuestHandler, PlatformDispatcher, PlatformMessage, ResponseHandle,
};

/// The main worker loop running inside the engine thread.
pub(crate) async fn run_worker(
    properties: EngineProperties,
    dispatcher: std::sync::Arc<dyn PlatformDispatcher>,
    mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
    init_tx: std::sync::mpsc::SyncSender<Result<(), String>>,
) -> Result<(), EngineError> {
    if let Err(message) = validate_properties(&properties) {
        let _ = init_tx.send(Err(message.clone()));
        return Err(EngineError::CreationFailed(message));
    }
    let _ = init_tx.send(Ok(()));
    tracing::debug!(
        assets = %properties.assets_path.display(),
        switches = ?properties.switches,
        "engine created"
    );

    let mut running = false;
    let mut guest_handlers: HashMap<String, GuestHandler> = HashMap::new();
    let mut events: Vec<AppEvent> = Vec::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            EngineCommand::Run { reply } => {
                let result = if running {
                    Err("engine is already running".to_owned())
                } else {
                    resolve_entrypoint(&properties.entrypoint).map(|entrypoint| {
                        running = true;
                        tracing::info!(
                            %entrypoint,
                            args = ?properties.entrypoint_args,
                            "engine running"
                        );
                    })
                };
                let _ = reply.send(result);
            }

            EngineCommand::Notify { event } => {
                tracing::debug!(event = ?event, "app event delivered");
                events.push(event);
            }

            EngineCommand::Send {
                channel,
                payload,
                reply,
            } => {
                let response = match guest_handlers.get_mut(&channel) {
                    Some(handler) => handler(&payload),
                    None => {
                        tracing::trace!(%channel, "no guest handler; replying empty");
                        None
                    }
                };
                if let Some(reply) = reply {
                    reply(response);
                }
            }

            EngineCommand::SetGuestHandler { channel, handler } => {
                guest_handlers.insert(channel, handler);
            }

            EngineCommand::ClearGuestHandler { channel } => {
                guest_handlers.remove(&channel);
            }

            EngineCommand::Inject {
                channel,
                payload,
                reply,
            } => {
                let response = reply.map(|tx| ResponseHandle::new(channel.clone(), tx));
                let message = PlatformMessage {
                    channel,
                    payload,
                    response,
                };
                if let Err(e) = dispatcher.dispatch(message) {
                    // The dispatcher has already completed the response
                    // handle (empty) on these paths.
                    tracing::warn!("inbound message not handled: {e}");
                }
            }

            EngineCommand::InspectEvents { reply } => {
                let _ = reply.send(events.clone());
            }

            EngineCommand::Shutdown => {
                tracing::debug!("engine shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Reject descriptors the engine cannot start from.
fn validate_properties(properties: &EngineProperties) -> Result<(), String> {
    if properties.assets_path.as_os_str().is_empty() {
        return Err("assets path must not be empty".to_owned());
    }
    if properties.icu_data_path.as_os_str().is_empty() {
        return Err("ICU data path must not be empty".to_owned());
    }
    Ok(())
}

/// Resolve the entrypoint name. Empty selects the default `main`.
fn resolve_entrypoint(name: &str) -> Result<String, String> {
    let name = if name.is_empty() { "main" } else { name };
    if name == "main" {
        Ok(name.to_owned())
    } else {
        Err(format!("entrypoint '{name}' not found in snapshot"))
    }
}
