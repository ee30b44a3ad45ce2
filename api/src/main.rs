use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use vibenvr_frame_api::AppState;
use vibenvr_live_common::config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let state = Arc::new(AppState::from_config(&config));

    let addr = config.server.bind.clone();
    info!(
        addr,
        frames_dir = %config.server.frames_dir.display(),
        synthetic = config.server.synthetic,
        auth = config.server.token.is_some(),
        "vibenvr frame API starting"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    if let Err(e) = vibenvr_frame_api::serve(listener, state).await {
        error!(error = %e, "frame API server failed");
        std::process::exit(1);
    }
}
