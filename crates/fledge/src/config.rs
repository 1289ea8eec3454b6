//! Application configuration types.
//!
//! Defines the structure of the app manifest on disk (fledge.toml) and
//! its mapping onto an engine creation descriptor.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use fledge_engine::EngineProperties;

use crate::error::Result;

/// App manifest (fledge.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppInfo,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Application information
#[derive(Debug, Clone, Deserialize)]
pub struct AppInfo {
    pub id: String,
    pub name: Option<String>,
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Asset bundle directory, relative to the app root.
    pub assets_dir: PathBuf,
    /// ICU data file, relative to the app root.
    pub icu_data_file: PathBuf,
    /// AOT snapshot library, relative to the app root. Ignored by
    /// JIT-mode engines; an absent file is not an error.
    pub aot_library_file: PathBuf,
    /// Entrypoint function to launch.
    pub entrypoint: String,
    /// Engine command-line switches.
    pub switches: Vec<String>,
    /// Arguments passed to the entrypoint.
    pub entrypoint_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("res/flutter_assets"),
            icu_data_file: PathBuf::from("res/icudtl.dat"),
            aot_library_file: PathBuf::from("lib/libapp.so"),
            entrypoint: "main".to_owned(),
            switches: Vec::new(),
            entrypoint_args: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load the manifest from a fledge.toml file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)?;
        tracing::debug!(app = %config.app.id, path = %path.display(), "loaded app manifest");
        Ok(config)
    }

    /// Resolve the engine configuration against an app root directory.
    pub fn to_properties(&self, app_root: &Path) -> EngineProperties {
        self.engine.to_properties(app_root)
    }
}

impl EngineConfig {
    /// Build the engine creation descriptor, resolving relative paths
    /// against the app root.
    pub fn to_properties(&self, app_root: &Path) -> EngineProperties {
        EngineProperties {
            assets_path: app_root.join(&self.assets_dir),
            icu_data_path: app_root.join(&self.icu_data_file),
            aot_library_path: app_root.join(&self.aot_library_file),
            switches: self.switches.clone(),
            entrypoint: self.entrypoint.clone(),
            entrypoint_args: self.entrypoint_args.clone(),
        }
    }
}
