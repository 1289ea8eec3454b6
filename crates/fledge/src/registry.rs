//! Plugin registry - maps plugin names to registrars.
//!
//! A registrar is a derived view, not owned state: it ties a plugin
//! name to the engine's messenger and is safe to recompute at any
//! time. The registry hands out one registrar per name and invalidates
//! them all at once when the engine is torn down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::messenger::BinaryMessenger;

/// A per-plugin view over the engine's binary messenger.
///
/// Invalid registrars (engine not yet created, or already terminated)
/// are well-defined values: `is_valid()` is false and `messenger()` is
/// `None`. Plugins can probe availability without risking an error.
#[derive(Clone)]
pub struct PluginRegistrar {
    name: Arc<str>,
    messenger: Option<Arc<BinaryMessenger>>,
    engine_generation: u64,
}

impl PluginRegistrar {
    /// The well-defined invalid registrar value.
    pub fn invalid() -> Self {
        Self {
            name: Arc::from(""),
            messenger: None,
            engine_generation: 0,
        }
    }

    /// The plugin name this registrar was created for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this registrar is backed by a live engine.
    pub fn is_valid(&self) -> bool {
        self.messenger
            .as_ref()
            .is_some_and(|messenger| messenger.is_live())
    }

    /// The messenger this plugin sends and receives on, if the
    /// registrar is valid.
    pub fn messenger(&self) -> Option<&Arc<BinaryMessenger>> {
        self.messenger.as_ref()
    }

    /// Generation of the engine this registrar was derived from
    /// (0 for the invalid registrar).
    pub fn engine_generation(&self) -> u64 {
        self.engine_generation
    }
}

impl std::fmt::Debug for PluginRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistrar")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .field("engine_generation", &self.engine_generation)
            .finish()
    }
}

/// Anything that can hand out plugin registrars.
///
/// Implemented by the lifecycle controller and the application adapter
/// so plugin setup code does not depend on either concretely.
pub trait PluginRegistrarProvider {
    /// Returns the registrar for the plugin with the given name. The
    /// name must be unique across the application. Never fails: when
    /// the engine is unavailable the invalid registrar is returned.
    fn registrar_for_plugin(&self, name: &str) -> PluginRegistrar;
}

/// Registry of plugin registrars for one engine.
pub struct PluginRegistry {
    registrars: DashMap<String, PluginRegistrar>,
    messenger: Arc<BinaryMessenger>,
    engine_generation: u64,
    torn_down: AtomicBool,
}

impl PluginRegistry {
    /// Create the registry for a freshly created engine.
    pub(crate) fn new(messenger: Arc<BinaryMessenger>, engine_generation: u64) -> Self {
        Self {
            registrars: DashMap::new(),
            messenger,
            engine_generation,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Look up (or create) the registrar for a plugin name.
    ///
    /// Idempotent per name. Returns the invalid registrar when the
    /// registry has been torn down or the engine is gone; this call
    /// never fails.
    pub fn registrar_for_plugin(&self, name: &str) -> PluginRegistrar {
        // The entry guard serializes against remove_all() on this
        // shard: either the lookup completes before teardown and the
        // new entry is cleared with the rest, or it observes the
        // torn-down flag and backs off.
        let entry = self.registrars.entry(name.to_owned());
        if self.torn_down.load(Ordering::SeqCst) || !self.messenger.is_live() {
            return PluginRegistrar::invalid();
        }
        entry
            .or_insert_with(|| {
                tracing::debug!(plugin = %name, "created plugin registrar");
                PluginRegistrar {
                    name: Arc::from(name),
                    messenger: Some(self.messenger.clone()),
                    engine_generation: self.engine_generation,
                }
            })
            .clone()
    }

    /// Number of registrars created so far.
    pub fn len(&self) -> usize {
        self.registrars.len()
    }

    /// Whether no registrars have been created.
    pub fn is_empty(&self) -> bool {
        self.registrars.is_empty()
    }

    /// Release all registrars.
    ///
    /// Called exactly once, at the start of termination, strictly
    /// before the engine handle is shut down. Lookups racing with this
    /// call either complete first or observe the torn-down state; no
    /// partial registrar is ever returned.
    pub(crate) fn remove_all(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        let released = self.registrars.len();
        self.registrars.clear();
        tracing::info!(released, "plugin registrars released");
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("registrars", &self.registrars.len())
            .field("engine_generation", &self.engine_generation)
            .field("torn_down", &self.torn_down.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fledge_engine::{EngineHandle, EngineProperties, spawn_engine};
    use parking_lot::Mutex;

    fn running_registry() -> (EngineHandle, Arc<BinaryMessenger>, PluginRegistry) {
        let messenger = Arc::new(BinaryMessenger::new());
        let properties = EngineProperties {
            assets_path: "app/flutter_assets".into(),
            icu_data_path: "app/icudtl.dat".into(),
            ..Default::default()
        };
        let handle = spawn_engine(properties, messenger.clone()).unwrap();
        messenger.attach(handle.messenger());
        let registry = PluginRegistry::new(messenger.clone(), handle.generation());
        (handle, messenger, registry)
    }

    #[tokio::test]
    async fn lookup_is_idempotent_per_name() {
        let (handle, messenger, registry) = running_registry();

        let a = registry.registrar_for_plugin("camera");
        let b = registry.registrar_for_plugin("camera");
        assert!(a.is_valid() && b.is_valid());
        assert_eq!(a.engine_generation(), b.engine_generation());
        assert_eq!(registry.len(), 1);

        // Both registrars route to the same channel state: a handler
        // registered through one is observed through the other.
        let seen = Arc::new(Mutex::new(Vec::<Bytes>::new()));
        let sink = seen.clone();
        a.messenger()
            .unwrap()
            .set_message_handler("camera/control", move |payload, _| {
                sink.lock().push(Bytes::copy_from_slice(payload));
            });
        assert!(Arc::ptr_eq(a.messenger().unwrap(), b.messenger().unwrap()));

        let rx = handle
            .inject_message_with_reply("camera/control", Bytes::from_static(b"open"))
            .unwrap();
        let _ = rx.await;
        assert_eq!(*seen.lock(), vec![Bytes::from_static(b"open")]);

        drop(messenger);
        handle.shutdown();
    }

    #[tokio::test]
    async fn lookup_after_remove_all_returns_invalid() {
        let (handle, _messenger, registry) = running_registry();

        let before = registry.registrar_for_plugin("sensor");
        assert!(before.is_valid());

        registry.remove_all();

        let after = registry.registrar_for_plugin("sensor");
        assert!(!after.is_valid());
        assert!(after.messenger().is_none());
        assert_eq!(registry.len(), 0);
        handle.shutdown();
    }

    #[tokio::test]
    async fn registrars_invalidate_when_engine_dies() {
        let (handle, _messenger, registry) = running_registry();
        let registrar = registry.registrar_for_plugin("battery");
        assert!(registrar.is_valid());

        handle.shutdown();

        // The existing registrar observes the dead engine, and new
        // lookups return the invalid value without failing.
        assert!(!registrar.is_valid());
        assert!(!registry.registrar_for_plugin("battery").is_valid());
    }

    #[test]
    fn invalid_registrar_is_well_defined() {
        let registrar = PluginRegistrar::invalid();
        assert!(!registrar.is_valid());
        assert!(registrar.messenger().is_none());
        assert_eq!(registrar.engine_generation(), 0);
    }
}
