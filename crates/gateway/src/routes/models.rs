//! Response bodies shared by several route groups.

use modnet_auth::{User, UserRole, UserStatus};
use modnet_chats::{Course, Module, ReportView, RoomSummary};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub status: String,
    pub consent_version: Option<String>,
    pub consent_given_at: Option<String>,
    /// Whether the recorded consent matches the current privacy notice.
    pub consent_current: bool,
    pub semester: Option<i64>,
    pub created_at: String,
}

impl UserResponse {
    pub fn new(user: &User, current_consent_version: &str) -> Self {
        Self {
            id: user.public_id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: role_name(user.role).to_owned(),
            status: status_name(user.status).to_owned(),
            consent_version: user.consent_version.clone(),
            consent_given_at: user.consent_given_at.clone(),
            consent_current: user.consent_version.as_deref() == Some(current_consent_version),
            semester: user.semester,
            created_at: user.created_at.clone(),
        }
    }
}

pub fn role_name(role: UserRole) -> &'static str {
    match role {
        UserRole::Student => "student",
        UserRole::Admin => "admin",
    }
}

pub fn status_name(status: UserStatus) -> &'static str {
    match status {
        UserStatus::Active => "active",
        UserStatus::Suspended => "suspended",
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CoursesResponse {
    pub courses: Vec<Course>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModulesResponse {
    pub modules: Vec<Module>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportsResponse {
    pub reports: Vec<ReportView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsersResponse {
    pub users: Vec<UserResponse>,
}
