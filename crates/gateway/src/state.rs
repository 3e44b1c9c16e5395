//! Shared application state for the gateway

use axum::http::HeaderMap;
use modnet_auth::{AuthSession, Authenticator, User};
use modnet_backend_runtime::BackendServices;
use modnet_chats::{AdminService, MessagingService, ModuleService, PresenceRegistry, ServerEvent};

use crate::hub::RoomHub;
use crate::util::require_bearer;
use crate::ApiError;

#[derive(Clone)]
pub struct AppState {
    services: BackendServices,
    hub: RoomHub,
}

impl AppState {
    pub fn new(services: BackendServices) -> Self {
        Self {
            services,
            hub: RoomHub::new(),
        }
    }

    pub fn services(&self) -> &BackendServices {
        &self.services
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.services.authenticator
    }

    pub fn modules(&self) -> &ModuleService {
        &self.services.modules
    }

    pub fn messaging(&self) -> &MessagingService {
        &self.services.messaging
    }

    pub fn admin(&self) -> &AdminService {
        &self.services.admin
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.services.presence
    }

    pub fn hub(&self) -> &RoomHub {
        &self.hub
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, AuthSession), ApiError> {
        self.services
            .authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }

    /// Resolve the bearer token of a request to its user.
    pub async fn current_user(&self, headers: &HeaderMap) -> Result<User, ApiError> {
        let token = require_bearer(headers)?;
        let (user, _) = self.authenticate(&token).await?;
        Ok(user)
    }

    /// Like [`Self::current_user`], but the user must have consented to the
    /// current privacy notice.
    pub async fn consenting_user(&self, headers: &HeaderMap) -> Result<User, ApiError> {
        let user = self.current_user(headers).await?;
        self.services.authenticator.require_consent(&user)?;
        Ok(user)
    }

    pub async fn admin_user(&self, headers: &HeaderMap) -> Result<User, ApiError> {
        let user = self.current_user(headers).await?;
        self.services.authenticator.require_admin(&user)?;
        Ok(user)
    }

    pub async fn broadcast(&self, event: ServerEvent) {
        let Some(room_id) = event.room_id().map(str::to_owned) else {
            return;
        };
        let receivers = self.hub.publish(&room_id, event).await;
        tracing::debug!(room_id = %room_id, receivers, "broadcast room event");
    }

    /// Drop every live subscription and presence entry of a user.
    pub async fn disconnect_user(&self, user_public_id: &str) {
        self.hub.revoke_everywhere(user_public_id).await;
        for presence in self.presence().evict_user(user_public_id).await {
            let room_id = presence.room_id.clone();
            self.hub.publish(&room_id, ServerEvent::Presence { presence }).await;
        }
    }
}
