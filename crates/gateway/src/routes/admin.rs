//! Moderation and platform administration. Every handler requires the admin role.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use modnet_auth::{UserRole, UserStatus};
use modnet_chats::{
    Course, MessageView, ModerationStats, Module, ReportAction, ReportStatus, ReportView, ServerEvent,
};
use modnet_privacy::ErasureReport;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    routes::{
        models::{ReportsResponse, UserResponse, UsersResponse},
        privacy::run_erasure,
    },
    ApiError, AppState,
};

const DEFAULT_USER_PAGE: u32 = 50;
const MAX_USER_PAGE: u32 = 200;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportsQuery {
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UsersQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveReportRequest {
    pub action: ReportAction,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResolveReportResponse {
    pub report: ReportView,
    /// Tombstone of the removed message for `remove_message`.
    pub message: Option<MessageView>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    #[schema(value_type = String, example = "admin")]
    pub role: UserRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(value_type = String, example = "suspended")]
    pub status: UserStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCourseRequest {
    pub code: String,
    pub name: String,
    pub semesters: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateModuleRequest {
    pub course_id: String,
    pub code: String,
    pub name: String,
    pub semester: i64,
}

#[utoipa::path(
    get,
    path = "/api/admin/reports",
    tag = "Admin",
    security(("bearerAuth" = [])),
    params(ReportsQuery),
    responses(
        (status = 200, description = "Reports, oldest first", body = ReportsResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportsQuery>,
    headers: HeaderMap,
) -> Result<Json<ReportsResponse>, ApiError> {
    state.admin_user(&headers).await?;
    let reports = state.admin().list_reports(query.status).await?;
    Ok(Json(ReportsResponse { reports }))
}

#[utoipa::path(
    post,
    path = "/api/admin/reports/{report_id}/resolve",
    tag = "Admin",
    security(("bearerAuth" = [])),
    params(("report_id" = String, Path, description = "Report public identifier")),
    request_body = ResolveReportRequest,
    responses(
        (status = 200, description = "Report resolved", body = ResolveReportResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse),
        (status = 404, description = "Report not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Report already handled", body = crate::error::ErrorResponse)
    )
)]
pub async fn resolve_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ResolveReportRequest>,
) -> Result<Json<ResolveReportResponse>, ApiError> {
    let admin = state.admin_user(&headers).await?;
    let (report, message) = state
        .admin()
        .resolve_report(&admin, &report_id, request.action)
        .await?;

    if let Some(message) = &message {
        state
            .broadcast(ServerEvent::MessageDeleted {
                message: message.clone(),
            })
            .await;
    }

    Ok(Json(ResolveReportResponse { report, message }))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "Admin",
    security(("bearerAuth" = [])),
    params(UsersQuery),
    responses(
        (status = 200, description = "Registered users", body = UsersResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
    headers: HeaderMap,
) -> Result<Json<UsersResponse>, ApiError> {
    state.admin_user(&headers).await?;
    let authenticator = state.authenticator();
    let limit = query.limit.unwrap_or(DEFAULT_USER_PAGE).clamp(1, MAX_USER_PAGE);
    let users = authenticator
        .list_users(limit, query.offset.unwrap_or(0))
        .await?
        .iter()
        .map(|user| UserResponse::new(user, authenticator.consent_version()))
        .collect();
    Ok(Json(UsersResponse { users }))
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{user_id}/role",
    tag = "Admin",
    security(("bearerAuth" = [])),
    params(("user_id" = String, Path, description = "User public identifier")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    state.admin_user(&headers).await?;
    let authenticator = state.authenticator();
    let user = authenticator.set_role(&user_id, request.role).await?;
    Ok(Json(UserResponse::new(&user, authenticator.consent_version())))
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{user_id}/status",
    tag = "Admin",
    security(("bearerAuth" = [])),
    params(("user_id" = String, Path, description = "User public identifier")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = UserResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let admin = state.admin_user(&headers).await?;
    if admin.public_id == user_id && request.status == UserStatus::Suspended {
        return Err(ApiError::bad_request("admins cannot suspend themselves"));
    }

    let authenticator = state.authenticator();
    let user = authenticator.set_status(&user_id, request.status).await?;
    if user.is_suspended() {
        state.disconnect_user(&user.public_id).await;
    }
    Ok(Json(UserResponse::new(&user, authenticator.consent_version())))
}

#[utoipa::path(
    post,
    path = "/api/admin/courses",
    tag = "Admin",
    security(("bearerAuth" = [])),
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Course created", body = Course),
        (status = 400, description = "Invalid course", body = crate::error::ErrorResponse),
        (status = 409, description = "Course code taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_course(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    state.admin_user(&headers).await?;
    let course = state
        .modules()
        .create_course(&request.code, &request.name, request.semesters)
        .await?;
    Ok((StatusCode::CREATED, Json(course)))
}

#[utoipa::path(
    post,
    path = "/api/admin/modules",
    tag = "Admin",
    security(("bearerAuth" = [])),
    request_body = CreateModuleRequest,
    responses(
        (status = 201, description = "Module and its room created", body = Module),
        (status = 400, description = "Invalid module", body = crate::error::ErrorResponse),
        (status = 404, description = "Course not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Module code taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateModuleRequest>,
) -> Result<(StatusCode, Json<Module>), ApiError> {
    state.admin_user(&headers).await?;
    let module = state
        .modules()
        .create_module(&request.course_id, &request.code, &request.name, request.semester)
        .await?;
    Ok((StatusCode::CREATED, Json(module)))
}

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    tag = "Admin",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Platform counters", body = ModerationStats),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse)
    )
)]
pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ModerationStats>, ApiError> {
    state.admin_user(&headers).await?;
    Ok(Json(state.admin().stats().await?))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{user_id}",
    tag = "Admin",
    security(("bearerAuth" = [])),
    params(("user_id" = String, Path, description = "User public identifier")),
    responses(
        (status = 200, description = "Account erased, per-step outcome", body = ErasureReport),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn erase_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ErasureReport>, ApiError> {
    let admin = state.admin_user(&headers).await?;
    info!(admin = %admin.public_id, user = %user_id, "account erasure requested by admin");
    Ok(Json(run_erasure(&state, &user_id).await?))
}
