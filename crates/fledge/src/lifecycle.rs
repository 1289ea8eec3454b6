//! Engine lifecycle controller.
//!
//! Owns the engine handle, the binary messenger and the plugin
//! registry, and drives them through the one legal state sequence:
//! Uninitialized -> Created -> Running -> Terminated. Out-of-order
//! calls are programming errors and panic at the point of misuse
//! rather than limping on with a dead engine.

use std::sync::Arc;

use parking_lot::Mutex;

use fledge_engine::{AppEvent, EngineHandle, EngineProperties, spawn_engine};

use crate::error::Result;
use crate::messenger::BinaryMessenger;
use crate::registry::{PluginRegistrar, PluginRegistrarProvider, PluginRegistry};

/// Lifecycle states of a controller, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No engine exists yet.
    Uninitialized,
    /// The engine exists but its entrypoint has not been launched.
    Created,
    /// The entrypoint is executing.
    Running,
    /// Terminal. No further transitions.
    Terminated,
}

struct Inner {
    state: LifecycleState,
    engine: Option<Arc<EngineHandle>>,
    registry: Option<Arc<PluginRegistry>>,
}

/// Drives one engine from creation to termination.
///
/// All methods are callable from any thread. The messenger is created
/// with the controller so plugins can be wired up before the engine
/// exists; it only becomes live once [`create`](Self::create) succeeds.
pub struct EngineController {
    messenger: Arc<BinaryMessenger>,
    inner: Mutex<Inner>,
}

impl EngineController {
    pub fn new() -> Self {
        Self {
            messenger: Arc::new(BinaryMessenger::new()),
            inner: Mutex::new(Inner {
                state: LifecycleState::Uninitialized,
                engine: None,
                registry: None,
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// The binary messenger shared by every plugin of this engine.
    pub fn messenger(&self) -> &Arc<BinaryMessenger> {
        &self.messenger
    }

    /// The engine handle, once created. `None` before `create` and
    /// after `shutdown`.
    pub fn engine_handle(&self) -> Option<Arc<EngineHandle>> {
        self.inner.lock().engine.clone()
    }

    /// Create the engine from a creation descriptor.
    ///
    /// Legal only in the Uninitialized state. On failure the error is
    /// returned and the controller stays Uninitialized; a failed
    /// creation never yields a partially wired engine.
    pub fn create(&self, properties: EngineProperties) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != LifecycleState::Uninitialized {
            panic!(
                "lifecycle violation: create called in state {:?}",
                inner.state
            );
        }

        let handle = spawn_engine(properties, self.messenger.clone())?;
        self.messenger.attach(handle.messenger());
        let registry = Arc::new(PluginRegistry::new(
            self.messenger.clone(),
            handle.generation(),
        ));

        tracing::info!(generation = handle.generation(), "engine created");
        inner.engine = Some(Arc::new(handle));
        inner.registry = Some(registry);
        inner.state = LifecycleState::Created;
        Ok(())
    }

    /// Launch the configured entrypoint.
    ///
    /// Legal only in the Created state. A launch failure is fatal for
    /// the engine: the error is returned and the caller is expected to
    /// shut the controller down.
    pub async fn run(&self) -> Result<()> {
        let engine = {
            let inner = self.inner.lock();
            if inner.state != LifecycleState::Created {
                panic!("lifecycle violation: run called in state {:?}", inner.state);
            }
            inner.engine.clone().expect("engine exists in Created state")
        };

        engine.run().await?;

        let mut inner = self.inner.lock();
        inner.state = LifecycleState::Running;
        tracing::info!("engine running");
        Ok(())
    }

    /// Forward an application event to the engine.
    ///
    /// Legal in the Created and Running states. Calling this with no
    /// live engine is a programming error and panics.
    pub fn notify(&self, event: AppEvent) {
        let inner = self.inner.lock();
        let engine = match (inner.state, &inner.engine) {
            (LifecycleState::Created | LifecycleState::Running, Some(engine)) => engine,
            _ => panic!(
                "lifecycle violation: notify called in state {:?}",
                inner.state
            ),
        };
        if engine.notify(event).is_err() {
            tracing::warn!("event dropped: engine command queue closed");
        }
    }

    /// Terminate the engine.
    ///
    /// Teardown order is fixed: plugin registrars are released first,
    /// then the messenger is torn down, then the engine handle is
    /// invalidated and its thread joined. Calling shutdown twice is a
    /// programming error and panics.
    pub fn shutdown(&self) {
        let (engine, registry) = {
            let mut inner = self.inner.lock();
            if inner.state == LifecycleState::Terminated {
                panic!("lifecycle violation: shutdown called twice");
            }
            inner.state = LifecycleState::Terminated;
            (inner.engine.take(), inner.registry.take())
        };

        if let Some(registry) = registry {
            registry.remove_all();
        }
        self.messenger.teardown();
        if let Some(engine) = engine {
            engine.shutdown();
        }
        tracing::info!("engine terminated");
    }
}

impl Default for EngineController {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistrarProvider for EngineController {
    /// Never fails: before `create` and after `shutdown` the invalid
    /// registrar is returned, so plugin lookup code needs no error
    /// path.
    fn registrar_for_plugin(&self, name: &str) -> PluginRegistrar {
        let registry = {
            let inner = self.inner.lock();
            match inner.state {
                LifecycleState::Created | LifecycleState::Running => inner.registry.clone(),
                _ => None,
            }
        };
        match registry {
            Some(registry) => registry.registrar_for_plugin(name),
            None => PluginRegistrar::invalid(),
        }
    }
}

impl std::fmt::Debug for EngineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineController")
            .field("state", &self.state())
            .finish()
    }
}
