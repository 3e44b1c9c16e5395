use axum::{extract::State, http::HeaderMap, Json};
use modnet_chats::ServerEvent;
use modnet_privacy::{confirm_erasure, erase_account, export_user_data, ErasureReport, UserExport};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct EraseAccountRequest {
    /// Must repeat the account's email address.
    pub confirm_email: String,
}

#[utoipa::path(
    get,
    path = "/api/me/export",
    tag = "Privacy",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Everything stored about the user", body = UserExport),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn export_data(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserExport>, ApiError> {
    let user = state.current_user(&headers).await?;
    let export = export_user_data(&state.services().db_pool, user.id).await?;
    Ok(Json(export))
}

#[utoipa::path(
    delete,
    path = "/api/me",
    tag = "Privacy",
    security(("bearerAuth" = [])),
    request_body = EraseAccountRequest,
    responses(
        (status = 200, description = "Account erased, per-step outcome", body = ErasureReport),
        (status = 400, description = "Confirmation email does not match", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn erase_own_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EraseAccountRequest>,
) -> Result<Json<ErasureReport>, ApiError> {
    let user = state.current_user(&headers).await?;
    confirm_erasure(&user.email, &request.confirm_email)?;

    info!(user = %user.public_id, "account erasure requested by user");
    let report = run_erasure(&state, &user.public_id).await?;
    Ok(Json(report))
}

/// Erase the account, tell room subscribers what disappeared and cut the
/// user's live connections.
pub(crate) async fn run_erasure(state: &AppState, user_public_id: &str) -> Result<ErasureReport, ApiError> {
    let services = state.services();
    let report = erase_account(&services.db_pool, &services.store, user_public_id).await?;
    if !report.is_complete() {
        warn!(
            user = %user_public_id,
            failed_steps = report.failures().count(),
            "erasure left data behind"
        );
    }

    for message in &report.removed_messages {
        state
            .broadcast(ServerEvent::MessageDeleted {
                message: message.clone(),
            })
            .await;
    }
    for message in &report.orphaned_replies {
        state
            .broadcast(ServerEvent::MessageUpdated {
                message: message.clone(),
            })
            .await;
    }

    state.disconnect_user(user_public_id).await;
    Ok(report)
}
