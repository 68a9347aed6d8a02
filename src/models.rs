// Response bodies for the API endpoints.

use serde::{Deserialize, Serialize};

/// Per-file result of the upscale/compress pipelines.
///
/// Serializes as `{"status":"success","image_path":...}` or
/// `{"status":"error","message":...,"filename":...}`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    Success {
        image_path: String,
    },
    Error {
        message: String,
        /// Absent for failures not tied to a specific file, such as a
        /// panicked batch task.
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Response body of the multi-file upscale endpoint: per-file results
/// partitioned into successful and failed lists.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BatchResponse {
    pub successful_files: Vec<FileOutcome>,
    pub error_files: Vec<String>,
}

impl BatchResponse {
    pub fn from_results(results: Vec<FileOutcome>) -> Self {
        let mut successful_files = Vec::new();
        let mut error_files = Vec::new();

        for result in results {
            match result {
                FileOutcome::Success { .. } => successful_files.push(result),
                // Failures not tied to a file are reported by their message.
                FileOutcome::Error { message, filename } => {
                    error_files.push(filename.unwrap_or(message));
                }
            }
        }

        Self {
            successful_files,
            error_files,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.error_files.is_empty()
    }
}

/// Response body of the audio normalization endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NormalizeResponse {
    pub status: String,
    pub audio_path: String,
}
