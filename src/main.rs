use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;

use resolve_pilot::remote::fake::FakeResolve;
use resolve_pilot::remote::Transport;
use resolve_pilot::state::{self, AppState};
use resolve_pilot::{api, logging, paths, settings};

#[derive(Parser)]
#[command(name = "resolve-pilot", about = "Tool server for driving DaVinci Resolve", version)]
struct Args {
    /// Config directory override
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Serve against an in-memory editor instead of the scripting bridge
    #[arg(long)]
    demo: bool,

    /// API port override (0 picks a free port)
    #[arg(long)]
    port: Option<u16>,
}

/// The bridge transport uses a blocking HTTP client, so the state is built
/// and dropped outside the async runtime.
fn main() {
    logging::init("info");
    let args = Args::parse();

    let app_config_dir = args.config_dir.unwrap_or_else(paths::default_app_config_dir);
    let loaded = settings::load_effective(&app_config_dir);
    let port = args.port.or(loaded.api_port).unwrap_or(0);

    let transport: Box<dyn Transport> = if args.demo {
        tracing::info!("demo mode: using the in-memory editor");
        Box::new(FakeResolve::demo())
    } else {
        match state::bridge_transport(&loaded) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "invalid bridge configuration");
                process::exit(1);
            }
        }
    };

    // Connecting tolerates an editor that is not running yet.
    let state = match AppState::connect(app_config_dir.clone(), loaded, transport) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(error = %e, "failed to start");
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            process::exit(1);
        }
    };
    let served = runtime.block_on(serve(state.clone(), port, &app_config_dir));
    drop(runtime);
    drop(state);
    if let Err(e) = served {
        tracing::error!(error = %e, "failed to start API server");
        process::exit(1);
    }
}

async fn serve(
    state: Arc<AppState>,
    port: u16,
    app_config_dir: &Path,
) -> Result<(), resolve_pilot::error::AppError> {
    let port = api::start_api_server(state.clone(), port).await?;
    state.api_port.store(port, Ordering::Relaxed);

    // Port file for external tool discovery.
    let port_file = paths::port_file_path(app_config_dir);
    if let Err(e) = std::fs::create_dir_all(app_config_dir)
        .and_then(|()| std::fs::write(&port_file, port.to_string()))
    {
        tracing::warn!(path = %port_file.display(), error = %e, "could not write port file");
    }
    tracing::info!(
        port,
        logic = %state.controller.source(),
        "API server listening on http://127.0.0.1:{port}"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    let _ = std::fs::remove_file(&port_file);
    tracing::info!("shutting down");
    Ok(())
}
