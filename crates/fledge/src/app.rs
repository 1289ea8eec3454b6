//! Service application adapter.
//!
//! Binds the lifecycle controller to the host platform's application
//! callbacks: create, terminate, and the stream of system events
//! (app-control requests, memory pressure, locale and region changes,
//! resume and pause). The host invokes these in its own order; the
//! adapter translates them into controller calls.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use fledge_engine::AppEvent;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::lifecycle::{EngineController, LifecycleState};
use crate::messenger::BinaryMessenger;
use crate::registry::{PluginRegistrar, PluginRegistrarProvider};

/// Environment variable holding extra engine switches, whitespace
/// separated. Merged after programmatic switches so it wins on
/// conflicting flags.
pub const ENGINE_ARGS_ENV: &str = "FLEDGE_ENGINE_ARGS";

/// A headless application hosting one engine.
pub struct ServiceApp {
    controller: EngineController,
    engine_config: EngineConfig,
    app_root: PathBuf,
    /// Switches accumulated before `on_create`; frozen afterwards.
    engine_args: Mutex<Vec<String>>,
}

impl ServiceApp {
    pub fn new(app_root: impl Into<PathBuf>, engine_config: EngineConfig) -> Self {
        Self {
            controller: EngineController::new(),
            engine_config,
            app_root: app_root.into(),
            engine_args: Mutex::new(Vec::new()),
        }
    }

    /// The lifecycle controller backing this application.
    pub fn controller(&self) -> &EngineController {
        &self.controller
    }

    /// The binary messenger shared by this application's plugins.
    pub fn messenger(&self) -> &Arc<BinaryMessenger> {
        self.controller.messenger()
    }

    /// Queue an extra engine switch.
    ///
    /// Only effective before `on_create`; later additions are ignored
    /// with a warning because the engine has already been configured.
    pub fn add_engine_arg(&self, arg: impl Into<String>) {
        if self.controller.state() != LifecycleState::Uninitialized {
            tracing::warn!("engine switch added after creation; ignoring");
            return;
        }
        self.engine_args.lock().push(arg.into());
    }

    /// Create the engine and launch its entrypoint.
    pub async fn on_create(&self) -> Result<()> {
        let mut properties = self.engine_config.to_properties(&self.app_root);
        properties.switches = merge_engine_args(
            properties.switches,
            self.engine_args.lock().clone(),
            std::env::var(ENGINE_ARGS_ENV).ok().as_deref(),
        );
        tracing::info!(switches = ?properties.switches, "starting service application");

        self.controller.create(properties)?;
        self.controller.run().await
    }

    /// Terminate the engine. Plugins are released before the engine
    /// stops, so their teardown can still observe a valid messenger
    /// lifetime ordering.
    pub fn on_terminate(&self) {
        self.controller.shutdown();
    }

    /// An app-control request arrived; forward its payload verbatim.
    pub fn on_app_control_received(&self, payload: Bytes) {
        self.controller.notify(AppEvent::AppControlReceived(payload));
    }

    pub fn on_low_memory(&self) {
        self.controller.notify(AppEvent::LowMemory);
    }

    pub fn on_locale_changed(&self) {
        self.controller.notify(AppEvent::LocaleChanged);
    }

    /// Region format changes are forwarded as their own event, not
    /// folded into locale changes, so in-engine code can distinguish
    /// the two.
    pub fn on_region_format_changed(&self) {
        self.controller.notify(AppEvent::RegionFormatChanged);
    }

    pub fn on_resume(&self) {
        self.controller.notify(AppEvent::Resumed);
    }

    pub fn on_pause(&self) {
        self.controller.notify(AppEvent::Paused);
    }
}

impl PluginRegistrarProvider for ServiceApp {
    fn registrar_for_plugin(&self, name: &str) -> PluginRegistrar {
        self.controller.registrar_for_plugin(name)
    }
}

impl std::fmt::Debug for ServiceApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceApp")
            .field("app_root", &self.app_root)
            .field("state", &self.controller.state())
            .finish()
    }
}

/// Merge engine switches from all three sources, in increasing
/// precedence: manifest, programmatic, environment.
fn merge_engine_args(
    manifest: Vec<String>,
    programmatic: Vec<String>,
    env_value: Option<&str>,
) -> Vec<String> {
    let mut merged = manifest;
    merged.extend(programmatic);
    if let Some(env_value) = env_value {
        merged.extend(env_value.split_whitespace().map(str::to_owned));
    }
    merged
}

/// Log panics through the tracing pipeline before the default hook
/// aborts the process. Installed once from `main`.
pub fn install_failure_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("fatal: {info}");
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_args_merge_in_precedence_order() {
        let merged = merge_engine_args(
            vec!["--from-manifest".to_owned()],
            vec!["--programmatic".to_owned()],
            Some("--from-env --another"),
        );
        assert_eq!(
            merged,
            vec!["--from-manifest", "--programmatic", "--from-env", "--another"]
        );
    }

    #[test]
    fn absent_env_adds_nothing() {
        let merged = merge_engine_args(vec!["--a".to_owned()], Vec::new(), None);
        assert_eq!(merged, vec!["--a"]);
    }

    #[tokio::test]
    async fn service_app_create_forward_terminate() {
        let app = ServiceApp::new("/opt/apps/demo", EngineConfig::default());
        app.add_engine_arg("--enable-dart-profiling");

        app.on_create().await.unwrap();
        assert_eq!(app.controller().state(), LifecycleState::Running);

        let payload = Bytes::from_static(b"\x01launch-request");
        app.on_app_control_received(payload.clone());
        app.on_low_memory();
        app.on_region_format_changed();
        app.on_resume();
        app.on_pause();

        let engine = app.controller().engine_handle().unwrap();
        let events = engine.notified_events().await.unwrap();
        assert_eq!(
            events,
            vec![
                AppEvent::AppControlReceived(payload),
                AppEvent::LowMemory,
                AppEvent::RegionFormatChanged,
                AppEvent::Resumed,
                AppEvent::Paused,
            ]
        );

        app.on_terminate();
        assert_eq!(app.controller().state(), LifecycleState::Terminated);
        assert!(!app.registrar_for_plugin("late").is_valid());
    }

    #[tokio::test]
    async fn engine_args_after_create_are_ignored() {
        let app = ServiceApp::new("/opt/apps/demo", EngineConfig::default());
        app.on_create().await.unwrap();

        app.add_engine_arg("--too-late");
        assert!(app.engine_args.lock().is_empty());
        app.on_terminate();
    }
}
