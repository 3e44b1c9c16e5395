use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use modnet_database::time;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{routes::models::UserResponse, util::require_bearer, ApiError, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginCodeRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginCodeResponse {
    pub email: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: String,
    pub first_login: bool,
    /// The user still has to accept the current privacy notice.
    pub consent_required: bool,
    pub user: UserResponse,
}

#[utoipa::path(
    post,
    path = "/api/auth/otp/request",
    tag = "Auth",
    request_body = LoginCodeRequest,
    responses(
        (status = 202, description = "Login code sent", body = LoginCodeResponse),
        (status = 400, description = "Invalid email", body = crate::error::ErrorResponse),
        (status = 403, description = "Email domain not allowed", body = crate::error::ErrorResponse),
        (status = 429, description = "A code was sent recently", body = crate::error::ErrorResponse)
    )
)]
pub async fn request_code(
    State(state): State<AppState>,
    Json(request): Json<LoginCodeRequest>,
) -> Result<(StatusCode, Json<LoginCodeResponse>), ApiError> {
    let issued = state.authenticator().request_login_code(&request.email).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(LoginCodeResponse {
            email: issued.email,
            expires_at: time::encode(issued.expires_at),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/otp/verify",
    tag = "Auth",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 401, description = "Invalid or expired code", body = crate::error::ErrorResponse),
        (status = 403, description = "Account suspended", body = crate::error::ErrorResponse),
        (status = 429, description = "Too many attempts", body = crate::error::ErrorResponse)
    )
)]
pub async fn verify_code(
    State(state): State<AppState>,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let authenticator = state.authenticator();
    let outcome = authenticator
        .verify_login_code(&request.email, &request.code)
        .await?;

    info!(user = %outcome.user.public_id, first_login = outcome.first_login, "user signed in");

    Ok(Json(SessionResponse {
        token: outcome.session.token,
        expires_at: time::encode(outcome.session.expires_at),
        first_login: outcome.first_login,
        consent_required: authenticator.require_consent(&outcome.user).is_err(),
        user: UserResponse::new(&outcome.user, authenticator.consent_version()),
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticator().logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Signed-in user", body = UserResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<UserResponse>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(UserResponse::new(&user, state.authenticator().consent_version())))
}
