//! Typed wrapper around the ModNet REST API.

use std::time::Duration;

use modnet_chats::{
    AttachmentView, Course, EditMessage, Enrollment, MessagePage, MessageView, Module, NewChannel,
    NewMessage, NewReport, ReportView, RoomPresence, RoomSummary,
};
use reqwest::{multipart, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The signed-in user as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub status: String,
    pub consent_version: Option<String>,
    pub consent_given_at: Option<String>,
    pub consent_current: bool,
    pub semester: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginCode {
    pub email: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub token: String,
    pub expires_at: String,
    pub first_login: bool,
    pub consent_required: bool,
    pub user: Profile,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct Rooms {
    rooms: Vec<RoomSummary>,
}

#[derive(Deserialize)]
struct Courses {
    courses: Vec<Course>,
}

#[derive(Deserialize)]
struct Modules {
    modules: Vec<Module>,
}

#[derive(Deserialize)]
struct ConsentNotice {
    version: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(base_url));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("modnet-client/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Realtime endpoint for the current session.
    pub fn websocket_url(&self) -> ClientResult<String> {
        let token = self.token.as_deref().ok_or(ClientError::MissingToken)?;
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(ClientError::InvalidUrl(self.base_url.clone()));
        };
        Ok(format!("{ws_base}/ws?token={token}"))
    }

    // Auth and profile

    pub async fn request_code(&self, email: &str) -> ClientResult<LoginCode> {
        let request = self.public(Method::POST, "/api/auth/otp/request");
        self.json(request.json(&json!({ "email": email }))).await
    }

    /// Exchange a login code for a session and keep its token.
    pub async fn verify_code(&mut self, email: &str, code: &str) -> ClientResult<Session> {
        let request = self.public(Method::POST, "/api/auth/otp/verify");
        let session: Session = self
            .json(request.json(&json!({ "email": email, "code": code })))
            .await?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    pub async fn logout(&mut self) -> ClientResult<()> {
        let request = self.authed(Method::POST, "/api/auth/logout")?;
        self.empty(request).await?;
        self.token = None;
        Ok(())
    }

    pub async fn me(&self) -> ClientResult<Profile> {
        self.json(self.authed(Method::GET, "/api/me")?).await
    }

    /// Version of the privacy notice users must accept.
    pub async fn consent_version(&self) -> ClientResult<String> {
        let notice: ConsentNotice = self.json(self.public(Method::GET, "/api/consent")).await?;
        Ok(notice.version)
    }

    pub async fn give_consent(&self, version: &str) -> ClientResult<Profile> {
        let request = self.authed(Method::POST, "/api/me/consent")?;
        self.json(request.json(&json!({ "version": version }))).await
    }

    pub async fn withdraw_consent(&self) -> ClientResult<Profile> {
        self.json(self.authed(Method::DELETE, "/api/me/consent")?).await
    }

    pub async fn update_display_name(&self, display_name: &str) -> ClientResult<Profile> {
        let request = self.authed(Method::PUT, "/api/me/profile")?;
        self.json(request.json(&json!({ "display_name": display_name })))
            .await
    }

    // Catalog and module selection

    pub async fn courses(&self) -> ClientResult<Vec<Course>> {
        let courses: Courses = self.json(self.authed(Method::GET, "/api/courses")?).await?;
        Ok(courses.courses)
    }

    pub async fn modules(&self, course_id: &str, semester: Option<i64>) -> ClientResult<Vec<Module>> {
        let mut request = self.authed(Method::GET, &format!("/api/courses/{course_id}/modules"))?;
        if let Some(semester) = semester {
            request = request.query(&[("semester", semester)]);
        }
        let modules: Modules = self.json(request).await?;
        Ok(modules.modules)
    }

    pub async fn my_modules(&self) -> ClientResult<Enrollment> {
        self.json(self.authed(Method::GET, "/api/me/modules")?).await
    }

    /// Store a module selection, switching course and semester first when given.
    pub async fn select_modules(
        &self,
        course: Option<(&str, i64)>,
        module_ids: &[String],
    ) -> ClientResult<Enrollment> {
        let body = match course {
            Some((course_id, semester)) => json!({
                "course_id": course_id,
                "semester": semester,
                "module_ids": module_ids,
            }),
            None => json!({ "module_ids": module_ids }),
        };
        let request = self.authed(Method::PUT, "/api/me/modules")?;
        self.json(request.json(&body)).await
    }

    // Rooms and channels

    pub async fn rooms(&self) -> ClientResult<Vec<RoomSummary>> {
        let rooms: Rooms = self.json(self.authed(Method::GET, "/api/rooms")?).await?;
        Ok(rooms.rooms)
    }

    pub async fn discover_channels(&self) -> ClientResult<Vec<RoomSummary>> {
        let rooms: Rooms = self.json(self.authed(Method::GET, "/api/channels")?).await?;
        Ok(rooms.rooms)
    }

    pub async fn create_channel(&self, channel: &NewChannel) -> ClientResult<RoomSummary> {
        let request = self.authed(Method::POST, "/api/channels")?;
        self.json(request.json(channel)).await
    }

    pub async fn join_channel(&self, room_id: &str) -> ClientResult<RoomSummary> {
        let path = format!("/api/channels/{room_id}/join");
        self.json(self.authed(Method::POST, &path)?).await
    }

    pub async fn leave_channel(&self, room_id: &str) -> ClientResult<RoomSummary> {
        let path = format!("/api/channels/{room_id}/membership");
        self.json(self.authed(Method::DELETE, &path)?).await
    }

    pub async fn room_presence(&self, room_id: &str) -> ClientResult<RoomPresence> {
        let path = format!("/api/rooms/{room_id}/presence");
        self.json(self.authed(Method::GET, &path)?).await
    }

    // Messages

    /// One page of history, oldest first. `before` is a message id.
    pub async fn messages(
        &self,
        room_id: &str,
        before: Option<&str>,
        limit: Option<u32>,
    ) -> ClientResult<MessagePage> {
        let mut request = self.authed(Method::GET, &format!("/api/rooms/{room_id}/messages"))?;
        if let Some(before) = before {
            request = request.query(&[("before", before)]);
        }
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        self.json(request).await
    }

    /// Messages created, edited or deleted after change position `since`.
    pub async fn messages_since(&self, room_id: &str, since: i64) -> ClientResult<MessagePage> {
        let request = self
            .authed(Method::GET, &format!("/api/rooms/{room_id}/messages"))?
            .query(&[("since", since)]);
        self.json(request).await
    }

    pub async fn send_message(&self, room_id: &str, message: &NewMessage) -> ClientResult<MessageView> {
        let request = self.authed(Method::POST, &format!("/api/rooms/{room_id}/messages"))?;
        self.json(request.json(message)).await
    }

    pub async fn edit_message(
        &self,
        room_id: &str,
        message_id: &str,
        content: &str,
    ) -> ClientResult<MessageView> {
        let path = format!("/api/rooms/{room_id}/messages/{message_id}");
        let edit = EditMessage {
            content: content.to_owned(),
        };
        self.json(self.authed(Method::PATCH, &path)?.json(&edit)).await
    }

    pub async fn delete_message(&self, room_id: &str, message_id: &str) -> ClientResult<MessageView> {
        let path = format!("/api/rooms/{room_id}/messages/{message_id}");
        self.json(self.authed(Method::DELETE, &path)?).await
    }

    pub async fn report_message(
        &self,
        room_id: &str,
        message_id: &str,
        reason: &str,
    ) -> ClientResult<ReportView> {
        let path = format!("/api/rooms/{room_id}/messages/{message_id}/reports");
        let report = NewReport {
            reason: reason.to_owned(),
        };
        self.json(self.authed(Method::POST, &path)?.json(&report)).await
    }

    // Attachments

    /// Upload a file as a pending attachment; pass its id in
    /// [`NewMessage::attachment_ids`] to publish it.
    pub async fn upload_attachment(
        &self,
        room_id: &str,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> ClientResult<AttachmentView> {
        let part = multipart::Part::bytes(data)
            .file_name(file_name.to_owned())
            .mime_str(content_type)?;
        let form = multipart::Form::new().part("file", part);
        let request = self
            .authed(Method::POST, &format!("/api/rooms/{room_id}/attachments"))?
            .multipart(form);
        self.json(request).await
    }

    pub async fn download_attachment(&self, attachment_id: &str) -> ClientResult<Vec<u8>> {
        let path = format!("/api/attachments/{attachment_id}");
        let response = self.send(self.authed(Method::GET, &path)?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // Privacy

    pub async fn export_data(&self) -> ClientResult<Value> {
        self.json(self.authed(Method::GET, "/api/me/export")?).await
    }

    /// Erase the signed-in account. Returns the server's per-step report.
    pub async fn erase_account(&mut self, confirm_email: &str) -> ClientResult<Value> {
        let request = self
            .authed(Method::DELETE, "/api/me")?
            .json(&json!({ "confirm_email": confirm_email }));
        let report = self.json(request).await?;
        self.token = None;
        Ok(report)
    }

    fn public(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url))
    }

    fn authed(&self, method: Method, path: &str) -> ClientResult<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ClientError::MissingToken)?;
        Ok(self.public(method, path).bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|body| body.error)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_owned()
            });
        debug!(status = status.as_u16(), %message, "request rejected");
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn empty(&self, request: RequestBuilder) -> ClientResult<()> {
        self.send(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_follows_scheme() {
        let client = ApiClient::new("https://chat.uni-example.de/")
            .unwrap()
            .with_token("abc");
        assert_eq!(
            client.websocket_url().unwrap(),
            "wss://chat.uni-example.de/ws?token=abc"
        );

        let local = ApiClient::new("http://127.0.0.1:7070").unwrap().with_token("t");
        assert_eq!(local.websocket_url().unwrap(), "ws://127.0.0.1:7070/ws?token=t");
    }

    #[test]
    fn websocket_url_requires_token() {
        let client = ApiClient::new("http://localhost:7070").unwrap();
        assert!(matches!(client.websocket_url(), Err(ClientError::MissingToken)));
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            ApiClient::new("ftp://example.org"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
