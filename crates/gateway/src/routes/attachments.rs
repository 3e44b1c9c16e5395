use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use modnet_chats::AttachmentView;

use crate::{ApiError, AppState};

const FILE_FIELD: &str = "file";

fn multipart_error(error: MultipartError) -> ApiError {
    ApiError::new(error.status(), error.body_text())
}

#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/attachments",
    tag = "Attachments",
    security(("bearerAuth" = [])),
    params(("room_id" = String, Path, description = "Room public identifier")),
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "A single `file` field"),
    responses(
        (status = 201, description = "Pending upload stored", body = AttachmentView),
        (status = 400, description = "Missing or empty file", body = crate::error::ErrorResponse),
        (status = 403, description = "Not a member", body = crate::error::ErrorResponse),
        (status = 413, description = "File too large", body = crate::error::ErrorResponse),
        (status = 415, description = "Content type not allowed", body = crate::error::ErrorResponse)
    )
)]
pub async fn upload_attachment(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AttachmentView>), ApiError> {
    let user = state.consenting_user(&headers).await?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_owned();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let data = field.bytes().await.map_err(multipart_error)?;

        let attachment = state
            .messaging()
            .upload_attachment(&user, &room_id, &file_name, &content_type, data)
            .await?;
        return Ok((StatusCode::CREATED, Json(attachment)));
    }

    Err(ApiError::bad_request("multipart field `file` is required"))
}

#[utoipa::path(
    get,
    path = "/api/attachments/{attachment_id}",
    tag = "Attachments",
    security(("bearerAuth" = [])),
    params(("attachment_id" = String, Path, description = "Attachment public identifier")),
    responses(
        (status = 200, description = "File contents"),
        (status = 403, description = "Not a member of the attachment's room", body = crate::error::ErrorResponse),
        (status = 404, description = "Attachment not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn download_attachment(
    State(state): State<AppState>,
    Path(attachment_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = state.consenting_user(&headers).await?;
    let download = state
        .messaging()
        .download_attachment(&user, &attachment_id)
        .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace(['"', '\\'], "_")
    );

    Ok((
        [
            (header::CONTENT_TYPE, download.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.data,
    )
        .into_response())
}
