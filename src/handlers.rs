// Axum handler functions for each API endpoint, plus the per-file upscale
// pipeline shared by the single- and multi-file routes.

use crate::{
    app::AppState,
    error::ApiError,
    extract::{UploadedFile, extract_upload, extract_uploads},
    models::{BatchResponse, FileOutcome, NormalizeResponse},
    recompress,
    temp::TempFile,
};
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::task::JoinSet;
use tracing::{info, warn};

// --- POST /upscale ---
// Stages the upload, runs it through the external upscaler, re-encodes the
// result as WebP. Provider failures are reported as a structured error body
// with HTTP 200 so callers can attribute the failure to the file itself.
pub async fn upscale_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FileOutcome>, ApiError> {
    let upload = extract_upload(multipart).await?;
    Ok(Json(process_single_image(&state, upload).await))
}

// --- POST /upscale_multiple ---
// Runs the single-file pipeline concurrently for every uploaded file, bounded
// by the configured permit count. Per-file failures never abort the batch;
// the response is 207 when any file failed, 200 otherwise.
pub async fn upscale_multiple_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let uploads = extract_uploads(multipart).await?;
    info!("Upscaling batch of {} file(s)", uploads.len());

    let mut tasks = JoinSet::new();
    for upload in uploads {
        let state = state.clone();
        tasks.spawn(async move {
            let _permit = match state.upscale_permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return FileOutcome::Error {
                        message: "upscale queue closed".to_string(),
                        filename: Some(upload.filename.clone()),
                    };
                }
            };
            process_single_image(&state, upload).await
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => results.push(outcome),
            // A panicked task leaves no way to know which file it carried.
            Err(e) => results.push(FileOutcome::Error {
                message: format!("upscale task failed: {}", e),
                filename: None,
            }),
        }
    }

    let response = BatchResponse::from_results(results);
    let status = if response.has_errors() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)).into_response())
}

// --- POST /compress ---
// Stages the upload, decodes it, and re-encodes it as lossy WebP.
pub async fn compress_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FileOutcome>, ApiError> {
    let upload = extract_upload(multipart).await?;

    let staged = TempFile::stage(&state.work_dir, &upload.filename, &upload.bytes)
        .await
        .map_err(|e| ApiError::Staging(format!("Failed to stage upload: {}", e)))?;

    let data = tokio::fs::read(staged.path())
        .await
        .map_err(|e| ApiError::Staging(format!("Failed to read staged file: {}", e)))?;

    let output_path = state
        .work_dir
        .join(format!("compressed_{}.webp", upload.filename));
    let written = recompress::compress_webp_file(data, output_path).await?;

    Ok(Json(FileOutcome::Success {
        image_path: written.display().to_string(),
    }))
}

// --- POST /normalize_audio ---
// Stages the upload, runs the normalization pipeline off-thread, and writes
// the encoded result next to the other outputs.
pub async fn normalize_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<NormalizeResponse>, ApiError> {
    let upload = extract_upload(multipart).await?;

    let staged = TempFile::stage(&state.work_dir, &upload.filename, &upload.bytes)
        .await
        .map_err(|e| ApiError::Staging(format!("Failed to stage upload: {}", e)))?;

    let data = tokio::fs::read(staged.path())
        .await
        .map_err(|e| ApiError::Staging(format!("Failed to read staged file: {}", e)))?;

    let encoded = crate::audio::normalize_audio(data, &state.ffmpeg).await?;

    let output_path = state
        .work_dir
        .join(format!("normalized_{}", upload.filename));
    tokio::fs::write(&output_path, &encoded)
        .await
        .map_err(|e| ApiError::Staging(format!("Failed to write normalized audio: {}", e)))?;

    info!("Normalization completed for {}", upload.filename);
    Ok(Json(NormalizeResponse {
        status: "success".to_string(),
        audio_path: output_path.display().to_string(),
    }))
}

/// Run one upload through stage, upscale, fetch, and compress. Always resolves
/// to a per-file outcome; the staged temp file is removed on every path.
pub async fn process_single_image(state: &AppState, upload: UploadedFile) -> FileOutcome {
    let filename = upload.filename.clone();
    match run_upscale_pipeline(state, &upload).await {
        Ok(image_path) => {
            info!("Processing completed for {}", filename);
            FileOutcome::Success { image_path }
        }
        Err(e) => {
            warn!("Error processing {}: {}", filename, e.message());
            FileOutcome::Error {
                message: e.message().to_string(),
                filename: Some(filename),
            }
        }
    }
}

async fn run_upscale_pipeline(state: &AppState, upload: &UploadedFile) -> Result<String, ApiError> {
    let staged = TempFile::stage(&state.work_dir, &upload.filename, &upload.bytes)
        .await
        .map_err(|e| ApiError::Staging(format!("Failed to stage upload: {}", e)))?;

    let url = state.upscaler.upscale(staged.path()).await?;
    let image = state.upscaler.fetch_result_image(&url).await?;

    let output_path = state
        .work_dir
        .join(format!("upscaled_{}.webp", upload.filename));
    let written = recompress::compress_image_to_webp(image, output_path).await?;

    Ok(written.display().to_string())
}
