// Multipart upload extraction shared by all endpoints.

use crate::{error::ApiError, temp::sanitize_filename};
use axum::extract::Multipart;
use tracing::{debug, warn};

/// An uploaded file pulled out of a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Extract exactly one uploaded file from a multipart request.
///
/// Fields without a filename are ignored; if several file fields are present
/// the last one wins, matching the single-file endpoints' contract.
pub async fn extract_upload(multipart: Multipart) -> Result<UploadedFile, ApiError> {
    let mut uploads = extract_uploads(multipart).await?;
    if uploads.len() > 1 {
        warn!(
            "Multiple file fields found in multipart request, using the last one ({} total)",
            uploads.len()
        );
    }
    uploads
        .pop()
        .ok_or_else(|| ApiError::BadRequest("Missing file field in multipart request.".to_string()))
}

/// Extract every uploaded file from a multipart request, in field order.
pub async fn extract_uploads(mut multipart: Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let mut uploads = Vec::new();
    let mut ignored_fields = 0;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to process multipart field: {}", e)))?
    {
        let Some(filename) = field.file_name().map(sanitize_filename) else {
            let field_name = field.name().unwrap_or("unnamed").to_string();
            debug!("Ignoring multipart field without filename: {}", field_name);
            ignored_fields += 1;
            continue;
        };

        let content_type = field.content_type().map(str::to_string);
        debug!(
            "Received file '{}' with content type: {:?}",
            filename, content_type
        );

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?;

        if data.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Uploaded file '{}' is empty.",
                filename
            )));
        }

        uploads.push(UploadedFile {
            filename,
            content_type,
            bytes: data.to_vec(),
        });
    }

    if ignored_fields > 0 {
        debug!(
            "Ignored {} non-file fields in multipart request",
            ignored_fields
        );
    }

    if uploads.is_empty() {
        return Err(ApiError::BadRequest(
            "Missing file field in multipart request.".to_string(),
        ));
    }

    Ok(uploads)
}
