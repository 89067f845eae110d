use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use talkback::{ServerConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity, info by default
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Handle CLI arguments
    let mut config_path: Option<PathBuf> = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            other => {
                anyhow::bail!("Unknown option '{other}'. Usage: talkback [-c|--config <file>]");
            }
        }
    }

    // Load configuration
    let config = match &config_path {
        Some(path) => ServerConfig::from_file(path),
        None => ServerConfig::from_env(),
    }
    .map_err(|e| anyhow!(e.to_string()))?;
    let address = config.address();
    tracing::info!(
        auth_enabled = config.auth_enabled,
        audio_format = %config.audio_format,
        "Starting server on {address}"
    );

    let app_state = AppState::new(config);
    app_state
        .check_audio_format()
        .map_err(|e| anyhow!(e))?;
    let app_state = Arc::new(app_state);
    let app = routes::create_app(app_state);

    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Server listening on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
