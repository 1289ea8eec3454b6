//! Fledge Service Host
//!
//! Runs a headless engine-hosted application from an app package
//! directory until the process is asked to stop.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fledge::{AppConfig, EngineConfig, ServiceApp};

/// Fledge Service Host
#[derive(Parser, Debug)]
#[command(name = "fledge")]
#[command(about = "Headless engine-hosted application runner", long_about = None)]
struct Args {
    /// Path to the app package directory
    #[arg(short, long, default_value = "./app")]
    app_root: PathBuf,

    /// Extra engine switches (repeatable)
    #[arg(long = "engine-arg")]
    engine_args: Vec<String>,
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fledge=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    fledge::app::install_failure_hook();

    let args = Args::parse();

    info!("Starting fledge v{}", env!("CARGO_PKG_VERSION"));

    // An app package without a manifest runs with the default layout.
    let manifest_path = args.app_root.join("fledge.toml");
    let engine_config = if manifest_path.exists() {
        AppConfig::load(&manifest_path)?.engine
    } else {
        info!(path = %manifest_path.display(), "no app manifest; using default layout");
        EngineConfig::default()
    };

    let app = ServiceApp::new(&args.app_root, engine_config);
    for arg in &args.engine_args {
        app.add_engine_arg(arg);
    }

    if let Err(e) = app.on_create().await {
        error!("failed to start application: {e}");
        app.on_terminate();
        return Err(e.into());
    }

    info!("application running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    app.on_terminate();
    Ok(())
}
