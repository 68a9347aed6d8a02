// Image re-encoding to lossy WebP.

use crate::error::ApiError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::info;

pub const WEBP_QUALITY: f32 = 75.0;
pub const WEBP_EFFORT: i32 = 6;

/// Decode uploaded bytes as an image, auto-detecting the format.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ApiError> {
    image::load_from_memory(bytes)
        .map_err(|e| ApiError::ImageProcessing(format!("Failed to decode image: {}", e)))
}

/// Encode `image` as lossy WebP at the given quality/effort and write it to
/// `output_path`.
pub fn compress_webp(
    image: &DynamicImage,
    output_path: &Path,
    quality: f32,
    effort: i32,
) -> Result<(), ApiError> {
    let rgba = image.to_rgba8();
    let encoder = webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height());

    let mut config = webp::WebPConfig::new()
        .map_err(|_| ApiError::ImageProcessing("Failed to initialize WebP encoder".to_string()))?;
    config.lossless = 0;
    config.quality = quality;
    config.method = effort;

    let encoded = encoder
        .encode_advanced(&config)
        .map_err(|e| ApiError::ImageProcessing(format!("WebP encoding failed: {:?}", e)))?;

    std::fs::write(output_path, &*encoded)
        .map_err(|e| ApiError::Staging(format!("Failed to write WebP output: {}", e)))?;

    info!("Compression completed for {}", output_path.display());
    Ok(())
}

/// Decode-and-encode on the blocking pool; used by the request path so the
/// CPU-bound encode does not stall the scheduler.
pub async fn compress_webp_file(
    bytes: Vec<u8>,
    output_path: PathBuf,
) -> Result<PathBuf, ApiError> {
    let path = output_path.clone();
    tokio::task::spawn_blocking(move || {
        let image = decode_image(&bytes)?;
        compress_webp(&image, &path, WEBP_QUALITY, WEBP_EFFORT)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("Compression task failed: {}", e)))??;
    Ok(output_path)
}

/// Encode an already-decoded image on the blocking pool.
pub async fn compress_image_to_webp(
    image: DynamicImage,
    output_path: PathBuf,
) -> Result<PathBuf, ApiError> {
    let path = output_path.clone();
    tokio::task::spawn_blocking(move || {
        compress_webp(&image, &path, WEBP_QUALITY, WEBP_EFFORT)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("Compression task failed: {}", e)))??;
    Ok(output_path)
}
