use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::storage::upload_key;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::upload::{UploadForm, UploadResponse};
use crate::state::AppState;
use crate::utils::filename::{key_safe_filename, validate_flat_filename};

const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn upload_body_limit(max_upload_size: u64) -> DefaultBodyLimit {
    let limit = usize::try_from(max_upload_size).unwrap_or(usize::MAX);
    DefaultBodyLimit::max(limit.saturating_add(MULTIPART_OVERHEAD))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Uploads",
    operation_id = "uploadFile",
    summary = "Upload a reference image or floor plan",
    description = "Stores the `file` multipart field under `uploads/` and returns its public URL. \
        Characters outside `a-zA-Z0-9-_.` in the filename are replaced with `_`.",
    request_body(content_type = "multipart/form-data", content = UploadForm),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 502, description = "Storage backend failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn upload_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
        file = Some((name, bytes.to_vec()));
    }

    let (name, bytes) = file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("File is empty".into()));
    }
    let max = state.config.storage.max_upload_size;
    if bytes.len() as u64 > max {
        return Err(AppError::Validation(format!(
            "File exceeds the maximum size of {max} bytes"
        )));
    }

    let filename = validate_flat_filename(&name).map_err(|e| AppError::Validation(e.message().into()))?;
    let content_type = mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string();
    let key = upload_key(&key_safe_filename(filename));

    let url = state.storage.put_public(&key, &bytes, &content_type).await?;
    tracing::info!(key = %key, size = bytes.len(), "Stored upload");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url,
            key,
            content_type,
            size: bytes.len() as u64,
        }),
    ))
}
