// Defines the unified error type for the API and its conversion into HTTP
// responses. Every endpoint surfaces failures through this type so clients
// always receive the same JSON error envelope.

use crate::{audio::AudioError, upscale::UpscaleError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// API server error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UnsupportedMediaType(String),
    ImageProcessing(String),
    AudioProcessing(String),
    Staging(String),
    Provider(String),
    Fetch(String),
    InternalServerError(String),
}

impl ApiError {
    pub fn parts(&self) -> (StatusCode, &str) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            Self::ImageProcessing(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::AudioProcessing(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Staging(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Provider(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Fetch(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        }
    }

    pub fn message(&self) -> &str {
        self.parts().1
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.parts();

        let body = Json(json!({
            "error": {
                "status": status.as_u16(),
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<UpscaleError> for ApiError {
    fn from(error: UpscaleError) -> Self {
        match error {
            UpscaleError::FetchFailed(_) | UpscaleError::ImageDecode(_) => {
                Self::Fetch(error.to_string())
            }
            _ => Self::Provider(error.to_string()),
        }
    }
}

impl From<AudioError> for ApiError {
    fn from(error: AudioError) -> Self {
        match error {
            AudioError::Decode(_) | AudioError::NoAudioTrack => {
                Self::UnsupportedMediaType(error.to_string())
            }
            _ => Self::AudioProcessing(error.to_string()),
        }
    }
}
