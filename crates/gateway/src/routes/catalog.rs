//! Course catalog and the signed-in user's module selection.

use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use modnet_chats::Enrollment;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    routes::models::{CoursesResponse, ModulesResponse},
    ApiError, AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ModulesQuery {
    pub semester: Option<i64>,
}

/// New module selection. When `course_id` is given the course and semester
/// are changed first; switching course drops every previous module.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateEnrollmentRequest {
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub semester: Option<i64>,
    #[serde(default)]
    pub module_ids: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/courses",
    tag = "Modules",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "All courses", body = CoursesResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_courses(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CoursesResponse>, ApiError> {
    state.current_user(&headers).await?;
    let courses = state.modules().list_courses().await?;
    Ok(Json(CoursesResponse { courses }))
}

#[utoipa::path(
    get,
    path = "/api/courses/{course_id}/modules",
    tag = "Modules",
    security(("bearerAuth" = [])),
    params(
        ("course_id" = String, Path, description = "Course public identifier"),
        ModulesQuery
    ),
    responses(
        (status = 200, description = "Modules of the course", body = ModulesResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse),
        (status = 404, description = "Course not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_modules(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(query): Query<ModulesQuery>,
    headers: HeaderMap,
) -> Result<Json<ModulesResponse>, ApiError> {
    state.current_user(&headers).await?;
    let modules = state.modules().list_modules(&course_id, query.semester).await?;
    Ok(Json(ModulesResponse { modules }))
}

#[utoipa::path(
    get,
    path = "/api/me/modules",
    tag = "Modules",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Selected course, semester and modules", body = Enrollment),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse),
        (status = 403, description = "Consent required", body = crate::error::ErrorResponse)
    )
)]
pub async fn my_modules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Enrollment>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    Ok(Json(state.modules().my_modules(&user).await?))
}

#[utoipa::path(
    put,
    path = "/api/me/modules",
    tag = "Modules",
    security(("bearerAuth" = [])),
    request_body = UpdateEnrollmentRequest,
    responses(
        (status = 200, description = "Selection stored", body = Enrollment),
        (status = 400, description = "Invalid selection", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse),
        (status = 403, description = "Consent required", body = crate::error::ErrorResponse),
        (status = 404, description = "Course or module not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_modules(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UpdateEnrollmentRequest>,
) -> Result<Json<Enrollment>, ApiError> {
    let user = state.consenting_user(&headers).await?;
    let modules = state.modules();
    let before = modules.my_modules(&user).await?;

    match (request.course_id.as_deref(), request.semester) {
        (Some(course_id), Some(semester)) => {
            modules.select_course(&user, course_id, semester).await?;
        }
        (Some(_), None) => return Err(ApiError::bad_request("semester is required with course_id")),
        (None, Some(_)) => return Err(ApiError::bad_request("course_id is required with semester")),
        (None, None) => {}
    }

    let after = match modules.select_modules(&user, &request.module_ids).await {
        Ok(after) => after,
        Err(error) => {
            // A course switch above may already have dropped rooms.
            let current = modules.my_modules(&user).await?;
            revoke_dropped_rooms(&state, &user.public_id, &before, &current).await;
            return Err(error.into());
        }
    };
    revoke_dropped_rooms(&state, &user.public_id, &before, &after).await;

    Ok(Json(after))
}

async fn revoke_dropped_rooms(state: &AppState, user_id: &str, before: &Enrollment, after: &Enrollment) {
    let kept: HashSet<&str> = after.modules.iter().map(|module| module.room_id.as_str()).collect();
    for module in before.modules.iter().filter(|module| !kept.contains(module.room_id.as_str())) {
        state.hub().revoke(&module.room_id, user_id).await;
    }
}
