//! Consent and profile endpoints.

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{routes::models::UserResponse, ApiError, AppState};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsentNotice {
    /// Version of the privacy notice users currently have to accept.
    pub version: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConsentRequest {
    pub version: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub display_name: String,
}

#[utoipa::path(
    get,
    path = "/api/consent",
    tag = "Consent",
    responses(
        (status = 200, description = "Current privacy notice version", body = ConsentNotice)
    )
)]
pub async fn consent_notice(State(state): State<AppState>) -> Json<ConsentNotice> {
    Json(ConsentNotice {
        version: state.authenticator().consent_version().to_owned(),
    })
}

#[utoipa::path(
    post,
    path = "/api/me/consent",
    tag = "Consent",
    security(("bearerAuth" = [])),
    request_body = ConsentRequest,
    responses(
        (status = 200, description = "Consent recorded", body = UserResponse),
        (status = 400, description = "Outdated notice version", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn give_consent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ConsentRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.current_user(&headers).await?;
    let authenticator = state.authenticator();
    let user = authenticator.give_consent(user.id, &request.version).await?;
    Ok(Json(UserResponse::new(&user, authenticator.consent_version())))
}

#[utoipa::path(
    delete,
    path = "/api/me/consent",
    tag = "Consent",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Consent withdrawn", body = UserResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn withdraw_consent(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.current_user(&headers).await?;
    let authenticator = state.authenticator();
    let user = authenticator.withdraw_consent(user.id).await?;

    // Without consent the user may no longer follow any room.
    state.disconnect_user(&user.public_id).await;

    Ok(Json(UserResponse::new(&user, authenticator.consent_version())))
}

#[utoipa::path(
    put,
    path = "/api/me/profile",
    tag = "Profile",
    security(("bearerAuth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Invalid display name", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.current_user(&headers).await?;
    let authenticator = state.authenticator();
    let user = authenticator
        .update_display_name(user.id, &request.display_name)
        .await?;
    Ok(Json(UserResponse::new(&user, authenticator.consent_version())))
}
