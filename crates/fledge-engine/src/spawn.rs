//! Engine spawn function.
//!
//! Creating an engine allocates a dedicated worker thread running a
//! current-thread tokio runtime. Creation is synchronous: the caller
//! blocks on a handshake until the worker has accepted (or rejected)
//! the creation descriptor, so an invalid descriptor fails here and
//! never yields a handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use tokio::sync::mpsc;

use crate::command::EngineCommand;
use crate::error::EngineError;
use crate::handle::EngineHandle;
use crate::types::{EngineProperties, PlatformDispatcher};
use crate::worker::run_worker;

/// Distinguishes engines across the process lifetime. Generation 0 is
/// reserved for the invalid/placeholder state.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Spawn an engine from a creation descriptor.
///
/// Inbound messages (guest → platform) are delivered through
/// `dispatcher`, always on the engine's own thread.
pub fn spawn_engine(
    properties: EngineProperties,
    dispatcher: Arc<dyn PlatformDispatcher>,
) -> Result<EngineHandle, EngineError> {
    let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(generation, "spawning engine");

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<EngineCommand>();
    let valid = Arc::new(AtomicBool::new(true));

    // Handshake channel: the worker reports descriptor acceptance before
    // entering its command loop.
    let (init_tx, init_rx) = std::sync::mpsc::sync_channel::<Result<(), String>>(1);

    let thread_handle = thread::Builder::new()
        .name(format!("fledge-engine-{generation}"))
        .spawn(move || -> Result<(), EngineError> {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(EngineError::SpawnFailed)?;

            let result = rt.block_on(run_worker(properties, dispatcher, cmd_rx, init_tx));
            rt.shutdown_background();
            result
        })?;

    match init_rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(message)) => {
            let _ = thread_handle.join();
            return Err(EngineError::CreationFailed(message));
        }
        Err(_) => {
            let _ = thread_handle.join();
            return Err(EngineError::ChannelClosed);
        }
    }

    Ok(EngineHandle {
        cmd_tx,
        valid,
        generation,
        thread_handle: std::sync::Mutex::new(Some(thread_handle)),
    })
}
