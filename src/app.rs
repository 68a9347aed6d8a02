// Router construction and shared application state.

use crate::{
    config::AppConfig,
    handlers,
    upscale::{UpscaleClient, UpscaleError},
};
use axum::{Router, extract::DefaultBodyLimit, http::HeaderValue, routing::post};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

/// Maximum accepted request body size.
pub const MAX_UPLOAD_SIZE_BYTES: usize = 50 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub upscaler: Arc<UpscaleClient>,
    pub upscale_permits: Arc<Semaphore>,
    pub ffmpeg: PathBuf,
    pub work_dir: PathBuf,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self, UpscaleError> {
        std::fs::create_dir_all(&config.work_dir)?;
        let upscaler = UpscaleClient::new(
            config.replicate_api_base.as_str(),
            config.replicate_api_token.as_str(),
        )?;
        Ok(Self {
            upscaler: Arc::new(upscaler),
            upscale_permits: Arc::new(Semaphore::new(config.max_concurrent_upscales.max(1))),
            ffmpeg: config.ffmpeg_program(),
            work_dir: config.work_dir.clone(),
        })
    }
}

pub fn create_app(state: AppState, allowed_origin: HeaderValue) -> Router {
    // Credentials are allowed, so methods/headers mirror the request instead
    // of using wildcards.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(allowed_origin))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    Router::new()
        .route("/upscale", post(handlers::upscale_image))
        .route("/upscale_multiple", post(handlers::upscale_multiple_images))
        .route("/compress", post(handlers::compress_image))
        .route("/normalize_audio", post(handlers::normalize_audio))
        // Apply a layer to limit the maximum size of request bodies
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE_BYTES))
        .layer(cors)
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        .with_state(state)
}
