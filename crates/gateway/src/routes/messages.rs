use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use modnet_chats::{EditMessage, MessagePage, MessageView, NewMessage, NewReport, ReportView, ServerEvent};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MessagesQuery {
    /// Return the page of messages older than this message id.
    pub before: Option<String>,
    pub limit: Option<u32>,
    /// Return every message created or changed after this change sequence
    /// number (the `seq` of the last message seen, or 0). Takes precedence
    /// over `before` and `limit`.
    pub since: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/messages",
    tag = "Messages",
    security(("bearerAuth" = [])),
    params(
        ("room_id" = String, Path, description = "Room public identifier"),
        MessagesQuery
    ),
    responses(
        (status = 200, description = "Messages in ascending order", body = MessagePage),
        (status = 400, description = "Malformed cursor", body = crate::error::ErrorResponse),
        (status = 403, description = "Not a member", body = crate::error::ErrorResponse),
        (status = 404, description = "Room not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<MessagesQuery>,
    headers: HeaderMap,
) -> Result<Json<MessagePage>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    let messaging = state.messaging();

    let page = match query.since.as_deref() {
        Some(since) => {
            let since = since
                .parse::<i64>()
                .map_err(|_| ApiError::bad_request("since must be a change sequence number"))?;
            messaging.messages_since(&user, &room_id, since).await?
        }
        None => {
            messaging
                .list_messages(&user, &room_id, query.before.as_deref(), query.limit)
                .await?
        }
    };
    Ok(Json(page))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/messages",
    tag = "Messages",
    security(("bearerAuth" = [])),
    params(("room_id" = String, Path, description = "Room public identifier")),
    request_body = NewMessage,
    responses(
        (status = 201, description = "Message created", body = MessageView),
        (status = 400, description = "Invalid message payload", body = crate::error::ErrorResponse),
        (status = 403, description = "Not a member", body = crate::error::ErrorResponse),
        (status = 404, description = "Room or reply target not found", body = crate::error::ErrorResponse),
        (status = 410, description = "Reply target was deleted", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<NewMessage>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let user = state.consenting_user(&headers).await?;
    let message = state.messaging().send_message(&user, &room_id, &request).await?;

    state
        .broadcast(ServerEvent::MessageCreated {
            message: message.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    patch,
    path = "/api/rooms/{room_id}/messages/{message_id}",
    tag = "Messages",
    security(("bearerAuth" = [])),
    params(
        ("room_id" = String, Path, description = "Room public identifier"),
        ("message_id" = String, Path, description = "Message public identifier")
    ),
    request_body = EditMessage,
    responses(
        (status = 200, description = "Message edited", body = MessageView),
        (status = 403, description = "Only the author may edit", body = crate::error::ErrorResponse),
        (status = 409, description = "Edit window closed", body = crate::error::ErrorResponse),
        (status = 410, description = "Message was deleted", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<EditMessage>,
) -> Result<Json<MessageView>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    let message = state
        .messaging()
        .edit_message(&user, &room_id, &message_id, &request.content)
        .await?;

    state
        .broadcast(ServerEvent::MessageUpdated {
            message: message.clone(),
        })
        .await;

    Ok(Json(message))
}

#[utoipa::path(
    delete,
    path = "/api/rooms/{room_id}/messages/{message_id}",
    tag = "Messages",
    security(("bearerAuth" = [])),
    params(
        ("room_id" = String, Path, description = "Room public identifier"),
        ("message_id" = String, Path, description = "Message public identifier")
    ),
    responses(
        (status = 200, description = "Tombstone of the deleted message", body = MessageView),
        (status = 403, description = "Only the author or an admin may delete", body = crate::error::ErrorResponse),
        (status = 404, description = "Message not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<MessageView>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    let deletion = state
        .messaging()
        .delete_message(&user, &room_id, &message_id)
        .await?;

    if deletion.newly_deleted {
        info!(user = %user.public_id, room_id = %room_id, message_id = %message_id, "message deleted");
        state
            .broadcast(ServerEvent::MessageDeleted {
                message: deletion.message.clone(),
            })
            .await;
    }

    Ok(Json(deletion.message))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/messages/{message_id}/reports",
    tag = "Messages",
    security(("bearerAuth" = [])),
    params(
        ("room_id" = String, Path, description = "Room public identifier"),
        ("message_id" = String, Path, description = "Message public identifier")
    ),
    request_body = NewReport,
    responses(
        (status = 201, description = "Report filed", body = ReportView),
        (status = 400, description = "Invalid reason or own message", body = crate::error::ErrorResponse),
        (status = 409, description = "Already reported", body = crate::error::ErrorResponse)
    )
)]
pub async fn report_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<NewReport>,
) -> Result<(StatusCode, Json<ReportView>), ApiError> {
    let user = state.consenting_user(&headers).await?;
    let report = state
        .messaging()
        .report_message(&user, &room_id, &message_id, &request.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}
