//! Fledge - Embedding Bridge for Headless Apps
//!
//! This crate provides the host side of the embedding bridge:
//! - Engine lifecycle control (create, run, terminate)
//! - Binary messaging between platform plugins and in-engine code
//! - Plugin registrar lookup that never fails
//! - Service application adapter for the host's app callbacks

// Re-export the engine crate
pub use fledge_engine;

// Service application adapter
pub mod app;

// App manifest loading
pub mod config;

// Error types
pub mod error;

// Engine lifecycle controller
pub mod lifecycle;

// Channel-based binary messaging
pub mod messenger;

// Plugin registrars
pub mod registry;

pub use app::ServiceApp;
pub use config::{AppConfig, EngineConfig};
pub use error::{Error, MessengerError, Result};
pub use lifecycle::{EngineController, LifecycleState};
pub use messenger::{BinaryHandler, BinaryMessenger, ReplyHandle};
pub use registry::{PluginRegistrar, PluginRegistrarProvider, PluginRegistry};
