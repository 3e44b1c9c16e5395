use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::auth::request_code,
        crate::routes::auth::verify_code,
        crate::routes::auth::logout,
        crate::routes::auth::me,
        crate::routes::profile::consent_notice,
        crate::routes::profile::give_consent,
        crate::routes::profile::withdraw_consent,
        crate::routes::profile::update_profile,
        crate::routes::catalog::list_courses,
        crate::routes::catalog::list_modules,
        crate::routes::catalog::my_modules,
        crate::routes::catalog::update_modules,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::discover_channels,
        crate::routes::rooms::create_channel,
        crate::routes::rooms::join_channel,
        crate::routes::rooms::leave_channel,
        crate::routes::rooms::room_presence,
        crate::routes::messages::list_messages,
        crate::routes::messages::create_message,
        crate::routes::messages::update_message,
        crate::routes::messages::delete_message,
        crate::routes::messages::report_message,
        crate::routes::attachments::upload_attachment,
        crate::routes::attachments::download_attachment,
        crate::routes::privacy::export_data,
        crate::routes::privacy::erase_own_account,
        crate::routes::admin::list_reports,
        crate::routes::admin::resolve_report,
        crate::routes::admin::list_users,
        crate::routes::admin::update_role,
        crate::routes::admin::update_status,
        crate::routes::admin::create_course,
        crate::routes::admin::create_module,
        crate::routes::admin::stats,
        crate::routes::admin::erase_user,
        crate::routes::websocket::websocket_handler
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::routes::health::HealthResponse,
            crate::routes::auth::LoginCodeRequest,
            crate::routes::auth::LoginCodeResponse,
            crate::routes::auth::VerifyCodeRequest,
            crate::routes::auth::SessionResponse,
            crate::routes::models::UserResponse,
            crate::routes::models::RoomsResponse,
            crate::routes::models::CoursesResponse,
            crate::routes::models::ModulesResponse,
            crate::routes::models::ReportsResponse,
            crate::routes::models::UsersResponse,
            crate::routes::profile::ConsentNotice,
            crate::routes::profile::ConsentRequest,
            crate::routes::profile::UpdateProfileRequest,
            crate::routes::catalog::UpdateEnrollmentRequest,
            crate::routes::privacy::EraseAccountRequest,
            crate::routes::admin::ResolveReportRequest,
            crate::routes::admin::ResolveReportResponse,
            crate::routes::admin::UpdateRoleRequest,
            crate::routes::admin::UpdateStatusRequest,
            crate::routes::admin::CreateCourseRequest,
            crate::routes::admin::CreateModuleRequest,
            modnet_chats::Course,
            modnet_chats::Module,
            modnet_chats::Enrollment,
            modnet_chats::RoomKind,
            modnet_chats::RoomSummary,
            modnet_chats::RoomPresence,
            modnet_chats::AuthorView,
            modnet_chats::ReplyPreview,
            modnet_chats::AttachmentView,
            modnet_chats::MessageView,
            modnet_chats::MessagePage,
            modnet_chats::NewMessage,
            modnet_chats::EditMessage,
            modnet_chats::NewChannel,
            modnet_chats::NewReport,
            modnet_chats::ReportStatus,
            modnet_chats::ReportAction,
            modnet_chats::ReportView,
            modnet_chats::ModerationStats,
            modnet_chats::ClientEvent,
            modnet_chats::ServerEvent,
            modnet_privacy::UserExport,
            modnet_privacy::export::ExportedProfile,
            modnet_privacy::export::ExportedConsent,
            modnet_privacy::export::ExportedCourse,
            modnet_privacy::export::ExportedModule,
            modnet_privacy::export::ExportedMembership,
            modnet_privacy::export::ExportedMessage,
            modnet_privacy::export::ExportedAttachment,
            modnet_privacy::export::ExportedReport,
            modnet_privacy::ErasureReport,
            modnet_privacy::ErasureStep
        )
    ),
    tags(
        (name = "Health", description = "Service health endpoints"),
        (name = "Auth", description = "One-time passcode login and sessions"),
        (name = "Consent", description = "Privacy notice consent"),
        (name = "Profile", description = "User profile management"),
        (name = "Modules", description = "Course catalog and module selection"),
        (name = "Rooms", description = "Module rooms and channels"),
        (name = "Messages", description = "Room messages, edits, deletion and reports"),
        (name = "Attachments", description = "File uploads and downloads"),
        (name = "Privacy", description = "Data export and account erasure"),
        (name = "Admin", description = "Moderation and administration"),
        (name = "WebSocket", description = "Realtime updates stream")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let schemes = &mut components.security_schemes;

        let mut scheme = SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer));
        if let SecurityScheme::Http(http) = &mut scheme {
            http.bearer_format = Some("Bearer".to_string());
        }

        schemes.insert("bearerAuth".to_string(), scheme);
    }
}
