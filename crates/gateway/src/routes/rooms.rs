use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use modnet_chats::{NewChannel, RoomPresence, RoomSummary};

use crate::{routes::models::RoomsResponse, ApiError, AppState};

#[utoipa::path(
    get,
    path = "/api/rooms",
    tag = "Rooms",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Rooms the user belongs to", body = RoomsResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse),
        (status = 403, description = "Consent required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RoomsResponse>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    let rooms = state.messaging().list_my_rooms(&user).await?;
    Ok(Json(RoomsResponse { rooms }))
}

#[utoipa::path(
    get,
    path = "/api/channels",
    tag = "Rooms",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Every channel, with membership flags", body = RoomsResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse),
        (status = 403, description = "Consent required", body = crate::error::ErrorResponse)
    )
)]
pub async fn discover_channels(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RoomsResponse>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    let rooms = state.messaging().discover_channels(&user).await?;
    Ok(Json(RoomsResponse { rooms }))
}

#[utoipa::path(
    post,
    path = "/api/channels",
    tag = "Rooms",
    security(("bearerAuth" = [])),
    request_body = NewChannel,
    responses(
        (status = 201, description = "Channel created", body = RoomSummary),
        (status = 400, description = "Invalid channel name", body = crate::error::ErrorResponse),
        (status = 409, description = "Channel name taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewChannel>,
) -> Result<(StatusCode, Json<RoomSummary>), ApiError> {
    let user = state.consenting_user(&headers).await?;
    let room = state
        .messaging()
        .create_channel(&user, &request.name, request.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[utoipa::path(
    post,
    path = "/api/channels/{room_id}/join",
    tag = "Rooms",
    security(("bearerAuth" = [])),
    params(("room_id" = String, Path, description = "Channel public identifier")),
    responses(
        (status = 200, description = "Joined", body = RoomSummary),
        (status = 400, description = "Module rooms follow module selection", body = crate::error::ErrorResponse),
        (status = 404, description = "Channel not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn join_channel(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RoomSummary>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    Ok(Json(state.messaging().join_channel(&user, &room_id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/channels/{room_id}/membership",
    tag = "Rooms",
    security(("bearerAuth" = [])),
    params(("room_id" = String, Path, description = "Channel public identifier")),
    responses(
        (status = 200, description = "Left the channel", body = RoomSummary),
        (status = 400, description = "Module rooms follow module selection", body = crate::error::ErrorResponse),
        (status = 404, description = "Channel not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn leave_channel(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RoomSummary>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    let room = state.messaging().leave_channel(&user, &room_id).await?;
    state.hub().revoke(&room.id, &user.public_id).await;
    Ok(Json(room))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/presence",
    tag = "Rooms",
    security(("bearerAuth" = [])),
    params(("room_id" = String, Path, description = "Room public identifier")),
    responses(
        (status = 200, description = "Users currently viewing the room", body = RoomPresence),
        (status = 403, description = "Not a member", body = crate::error::ErrorResponse),
        (status = 404, description = "Room not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn room_presence(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RoomPresence>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    state.messaging().require_membership(&room_id, &user).await?;
    Ok(Json(state.presence().snapshot(&room_id).await))
}
