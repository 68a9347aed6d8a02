// Main entry point for the media-relay-server application.
// Loads configuration, initializes logging, builds the Axum router, and
// starts the HTTP server.

use axum::http::HeaderValue;
use clap::Parser;
use media_relay_server::{
    app::{AppState, create_app},
    config::AppConfig,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load a local .env file if present, then parse args and environment.
    dotenv::dotenv().ok();
    let config = AppConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("Starting media-relay-server...");
    tracing::info!("Work directory: {}", config.work_dir.display());
    tracing::info!("Upscale provider: {}", config.replicate_api_base);

    let allowed_origin = match config.allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => origin,
        Err(e) => {
            tracing::error!(
                "FATAL: Invalid allowed origin '{}': {}",
                config.allowed_origin,
                e
            );
            eprintln!("FATAL: Invalid allowed origin. Exiting.");
            std::process::exit(1);
        }
    };

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("FATAL: Failed to initialize application state: {}", e);
            eprintln!("FATAL: Initialization failed. See logs for details. Exiting.");
            std::process::exit(1);
        }
    };

    let app = create_app(state, allowed_origin);
    tracing::info!("Axum router configured.");

    let listener = match create_listener(&config.host, config.port).await {
        Ok((addr, listener)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            listener
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            eprintln!("FATAL: Could not bind server. Error: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
        eprintln!("ERROR: Server shut down unexpectedly. Error: {}", e);
    }

    tracing::info!("media-relay-server has shut down.");
}

async fn create_listener(
    host: &str,
    port: u16,
) -> std::io::Result<(String, tokio::net::TcpListener)> {
    let host = if host == "*" { "0.0.0.0" } else { host };
    let addr = format!("{}:{}", host, port);
    tracing::info!("Attempting to bind server to {}...", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    Ok((addr, listener))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
