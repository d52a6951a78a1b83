//! Route handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::error::ApiError;
use super::upload::{allowed_file, secure_filename};
use super::AppState;
use crate::services::ImageIOService;

const IMAGE_FIELD: &str = "image";
const RESULT_FILENAME: &str = "removed_bg.png";

const NO_IMAGE: &str = "No image provided";
const NO_SELECTED_FILE: &str = "No selected file";
const INVALID_FILE_TYPE: &str = "Invalid file type";

/// Payload of the status route
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: &'static str,
    pub status: &'static str,
}

/// `GET /`
pub async fn home() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "Background Removal API",
        status: "active",
    })
}

/// `POST /remove-bg`
///
/// Expects a multipart form with an `image` file field and answers with the
/// cut-out as a PNG attachment.
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        debug!("Rejected non-multipart upload: {rejection}");
        ApiError::bad_request(NO_IMAGE)
    })?;

    let (filename, data) = read_image_field(&mut multipart).await?;

    let safe_name = secure_filename(&filename);
    info!(filename = %safe_name, bytes = data.len(), "Processing upload");

    let segmenter = Arc::clone(&state.segmenter);
    let start = Instant::now();

    let png = tokio::task::spawn_blocking(move || -> crate::error::Result<Vec<u8>> {
        let image = ImageIOService::load_from_bytes(&data)?;
        let decoded = start.elapsed();
        let result = segmenter.segment(&image)?;
        let segmented = start.elapsed();
        let png = ImageIOService::encode_png(&result)?;
        debug!(
            decode_ms = decoded.as_millis() as u64,
            segment_ms = (segmented - decoded).as_millis() as u64,
            encode_ms = (start.elapsed() - segmented).as_millis() as u64,
            "Pipeline stages finished"
        );
        Ok(png)
    })
    .await
    .map_err(|e| {
        error!("Background removal worker failed: {e}");
        ApiError::internal(e.to_string())
    })?
    .map_err(|e| {
        error!(filename = %safe_name, "Background removal failed: {e}");
        ApiError::from(e)
    })?;

    info!(
        filename = %safe_name,
        output_bytes = png.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Background removed"
    );

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={RESULT_FILENAME}"),
            ),
        ],
        png,
    )
        .into_response())
}

/// Find the first `image` file field and validate its filename
///
/// Parts named `image` that are plain form values (no filename) are skipped.
async fn read_image_field(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ApiError::bad_request(NO_IMAGE)),
            Err(e) => return Err(multipart_error(&e)),
        };

        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };

        if filename.is_empty() {
            return Err(ApiError::bad_request(NO_SELECTED_FILE));
        }
        if !allowed_file(&filename) {
            debug!(filename = %filename, "Rejected upload extension");
            return Err(ApiError::bad_request(INVALID_FILE_TYPE));
        }

        let data = field.bytes().await.map_err(|e| multipart_error(&e))?;
        return Ok((filename, data));
    }
}

fn multipart_error(err: &MultipartError) -> ApiError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Upload exceeded the body limit");
        return ApiError::new(status, err.body_text());
    }
    debug!("Malformed multipart body: {err}");
    ApiError::bad_request(NO_IMAGE)
}
