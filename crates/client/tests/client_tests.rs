use std::time::Duration;

use anyhow::{bail, Context};
use httpmock::prelude::*;
use modnet_client::{ApiClient, ClientError, NewMessage, RoomSync, SyncMode, SyncOptions, SyncUpdate};
use serde_json::{json, Value};

type TestResult<T = ()> = anyhow::Result<T>;

const ROOM: &str = "room-algo";
const TOKEN: &str = "session-token";

fn message(id: &str, second: u32, content: &str) -> Value {
    let at = format!("2024-05-01T10:00:{second:02}.000000Z");
    json!({
        "id": id,
        "room_id": ROOM,
        "author": { "id": "user-ada", "display_name": "Ada" },
        "content": content,
        "reply_to": null,
        "attachments": [],
        "created_at": at,
        "updated_at": at,
        "edited_at": null,
        "deleted_at": null,
        "seq": second
    })
}

fn profile(email: &str) -> Value {
    json!({
        "id": "user-ada",
        "email": email,
        "display_name": "ada",
        "role": "student",
        "status": "active",
        "consent_version": null,
        "consent_given_at": null,
        "consent_current": false,
        "semester": null,
        "created_at": "2024-05-01T09:00:00.000000Z"
    })
}

mod api_client_tests {
    use super::*;

    #[tokio::test]
    async fn verify_code_stores_the_session_token() -> TestResult {
        let server = MockServer::start_async().await;
        let verify = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/auth/otp/verify")
                    .json_body(json!({ "email": "ada@uni-example.de", "code": "123456" }));
                then.status(200).json_body(json!({
                    "token": TOKEN,
                    "expires_at": "2024-05-08T10:00:00.000000Z",
                    "first_login": true,
                    "consent_required": true,
                    "user": profile("ada@uni-example.de")
                }));
            })
            .await;
        let me = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/me")
                    .header("authorization", format!("Bearer {TOKEN}"));
                then.status(200).json_body(profile("ada@uni-example.de"));
            })
            .await;

        let mut client = ApiClient::new(&server.base_url())?;
        let session = client.verify_code("ada@uni-example.de", "123456").await?;
        assert!(session.consent_required);
        assert_eq!(client.token(), Some(TOKEN));

        let user = client.me().await?;
        assert_eq!(user.email, "ada@uni-example.de");

        verify.assert_async().await;
        me.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn server_errors_carry_status_and_message() -> TestResult {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("/api/rooms/{ROOM}/messages"));
                then.status(403)
                    .json_body(json!({ "error": "access denied: not a member of this room" }));
            })
            .await;

        let client = ApiClient::new(&server.base_url())?.with_token(TOKEN);
        let error = client
            .send_message(ROOM, &NewMessage::text("hallo"))
            .await
            .expect_err("request should be rejected");

        match error {
            ClientError::Api { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("not a member"));
            }
            other => bail!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn authed_calls_need_a_token() -> TestResult {
        let client = ApiClient::new("http://127.0.0.1:9")?;
        assert!(matches!(client.rooms().await, Err(ClientError::MissingToken)));
        Ok(())
    }

    #[tokio::test]
    async fn since_polls_send_the_cursor() -> TestResult {
        let server = MockServer::start_async().await;
        let poll = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/api/rooms/{ROOM}/messages"))
                    .query_param("since", "1");
                then.status(200).json_body(json!({
                    "messages": [message("m2", 2, "zweite")],
                    "has_more": false
                }));
            })
            .await;

        let client = ApiClient::new(&server.base_url())?.with_token(TOKEN);
        let page = client.messages_since(ROOM, 1).await?;
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].id, "m2");
        poll.assert_async().await;
        Ok(())
    }
}

mod room_sync_tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_polling_without_realtime() -> TestResult {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/api/rooms/{ROOM}/messages"))
                    .query_param("limit", "50");
                then.status(200).json_body(json!({
                    "messages": [message("m1", 1, "erste")],
                    "has_more": false
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/api/rooms/{ROOM}/messages"))
                    .query_param_exists("since");
                // The overlap with the first page must not duplicate m1.
                then.status(200).json_body(json!({
                    "messages": [message("m1", 1, "erste"), message("m2", 2, "zweite")],
                    "has_more": false
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/api/rooms/{ROOM}/presence"));
                then.status(200).json_body(json!({
                    "room_id": ROOM,
                    "online_count": 1,
                    "user_ids": ["user-bob"]
                }));
            })
            .await;

        let api = ApiClient::new(&server.base_url())?.with_token(TOKEN);
        let options = SyncOptions {
            page_size: 50,
            poll_interval: Duration::from_millis(50),
        };
        let (sync, mut updates) = RoomSync::new(api, ROOM, options);
        let state = sync.state();
        let task = sync.spawn();

        let mut saw_polling = false;
        let mut saw_presence = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !(saw_polling && saw_presence && state.read().await.timeline.len() == 2) {
            let update = tokio::time::timeout_at(deadline, updates.recv())
                .await
                .context("sync did not converge")?
                .context("sync stopped")?;
            match update {
                SyncUpdate::Mode(SyncMode::Polling) => saw_polling = true,
                SyncUpdate::Presence(presence) => {
                    assert_eq!(presence.online_count, 1);
                    saw_presence = true;
                }
                _ => {}
            }
        }

        {
            let state = state.read().await;
            let ids: Vec<&str> = state
                .timeline
                .messages()
                .iter()
                .map(|message| message.id.as_str())
                .collect();
            assert_eq!(ids, ["m1", "m2"]);
            assert_eq!(state.mode, SyncMode::Polling);
            assert_eq!(state.presence.online_count(ROOM), 1);
        }

        drop(updates);
        let outcome = tokio::time::timeout(Duration::from_secs(5), task).await??;
        assert!(outcome.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn stops_when_room_access_is_denied() -> TestResult {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/api/rooms/{ROOM}/messages"));
                then.status(403)
                    .json_body(json!({ "error": "access denied: not a member of this room" }));
            })
            .await;

        let api = ApiClient::new(&server.base_url())?.with_token(TOKEN);
        let (sync, _updates) = RoomSync::new(api, ROOM, SyncOptions::default());
        let outcome = sync.run().await;

        assert_eq!(outcome.err().and_then(|error| error.status()), Some(403));
        Ok(())
    }
}
