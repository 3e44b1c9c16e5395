//! # ModNet Gateway Crate
//!
//! HTTP and WebSocket surface of the ModNet backend. REST handlers translate
//! requests into calls on the auth, chat and privacy services; the realtime
//! endpoint fans room events out to subscribed sockets through [`RoomHub`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modnet_gateway::{build_router, AppState};
//!
//! let services = BackendServices::initialise(&config).await?;
//! let app = build_router(AppState::new(services));
//! axum::serve(listener, app).await?;
//! ```

pub mod docs;
mod error;
pub mod hub;
pub mod middleware;
pub mod routes;
mod state;
mod util;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use hub::{HubEvent, RoomHub};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Router,
};

/// Multipart framing overhead allowed on top of the attachment size limit.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let config = &state.services().config;
    let upload_limit = config
        .storage
        .max_attachment_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let upload_limit = usize::try_from(upload_limit).unwrap_or(usize::MAX);
    let cors = middleware::cors_layer(&config.http.allowed_origins);

    #[allow(unused_mut)]
    let mut router = Router::new()
        .route("/health", get(routes::health::health_check))
        // Auth
        .route("/api/auth/otp/request", post(routes::auth::request_code))
        .route("/api/auth/otp/verify", post(routes::auth::verify_code))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route(
            "/api/me",
            get(routes::auth::me).delete(routes::privacy::erase_own_account),
        )
        // Consent and profile
        .route("/api/consent", get(routes::profile::consent_notice))
        .route(
            "/api/me/consent",
            post(routes::profile::give_consent).delete(routes::profile::withdraw_consent),
        )
        .route("/api/me/profile", put(routes::profile::update_profile))
        .route("/api/me/export", get(routes::privacy::export_data))
        // Catalog and module selection
        .route("/api/courses", get(routes::catalog::list_courses))
        .route(
            "/api/courses/:course_id/modules",
            get(routes::catalog::list_modules),
        )
        .route(
            "/api/me/modules",
            get(routes::catalog::my_modules).put(routes::catalog::update_modules),
        )
        // Rooms and channels
        .route("/api/rooms", get(routes::rooms::list_rooms))
        .route(
            "/api/channels",
            get(routes::rooms::discover_channels).post(routes::rooms::create_channel),
        )
        .route(
            "/api/channels/:room_id/join",
            post(routes::rooms::join_channel),
        )
        .route(
            "/api/channels/:room_id/membership",
            delete(routes::rooms::leave_channel),
        )
        .route(
            "/api/rooms/:room_id/presence",
            get(routes::rooms::room_presence),
        )
        // Messages
        .route(
            "/api/rooms/:room_id/messages",
            get(routes::messages::list_messages).post(routes::messages::create_message),
        )
        .route(
            "/api/rooms/:room_id/messages/:message_id",
            patch(routes::messages::update_message).delete(routes::messages::delete_message),
        )
        .route(
            "/api/rooms/:room_id/messages/:message_id/reports",
            post(routes::messages::report_message),
        )
        // Attachments
        .route(
            "/api/rooms/:room_id/attachments",
            post(routes::attachments::upload_attachment)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/attachments/:attachment_id",
            get(routes::attachments::download_attachment),
        )
        // Admin
        .route("/api/admin/reports", get(routes::admin::list_reports))
        .route(
            "/api/admin/reports/:report_id/resolve",
            post(routes::admin::resolve_report),
        )
        .route("/api/admin/users", get(routes::admin::list_users))
        .route("/api/admin/users/:user_id", delete(routes::admin::erase_user))
        .route(
            "/api/admin/users/:user_id/role",
            put(routes::admin::update_role),
        )
        .route(
            "/api/admin/users/:user_id/status",
            put(routes::admin::update_status),
        )
        .route("/api/admin/courses", post(routes::admin::create_course))
        .route("/api/admin/modules", post(routes::admin::create_module))
        .route("/api/admin/stats", get(routes::admin::stats))
        // Realtime
        .route("/ws", get(routes::websocket::websocket_handler))
        .with_state(state);

    #[cfg(debug_assertions)]
    {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;

        router = router.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
        );
    }

    router
        .layer(cors)
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
