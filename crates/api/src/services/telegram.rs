//! Telegram Bot API client and webhook update types.

use std::time::Duration;

use async_trait::async_trait;
use domain::services::{ChatInfo, ChatPlatform, PlatformError};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use shared::markdown::escape_markdown_v2;

use crate::config::TelegramConfig;

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct BotApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    pub title: Option<String>,
}

/// A user asking to join a chat that requires admin approval.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatJoinRequest {
    pub chat: TelegramChat,
    pub from: TelegramUser,
    /// Private chat the bot may use to reach the requester.
    pub user_chat_id: Option<i64>,
    pub date: i64,
}

/// Incoming webhook update. Only the fields Join Guard acts on are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub chat_join_request: Option<ChatJoinRequest>,
}

/// MarkdownV2 private message pointing the requester at the verification page.
pub fn verification_prompt(chat_title: Option<&str>, url: &str, ttl_minutes: i64) -> String {
    let title = chat_title.unwrap_or("the group");
    // Inside a link target only `)` and `\` need escaping.
    let target = url.replace('\\', "\\\\").replace(')', "\\)");
    format!(
        "👋 To join *{}*, please confirm you are human\\.\n\n[Open verification page]({})\n\nThe link expires in {} minutes\\.",
        escape_markdown_v2(title),
        target,
        ttl_minutes
    )
}

pub struct TelegramClient {
    client: Client,
    /// `{api_base}/bot{token}`. Never logged.
    endpoint: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PlatformError::Transport(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}",
                config.api_base_url.trim_end_matches('/'),
                config.bot_token
            ),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, PlatformError> {
        let response = self
            .client
            .post(format!("{}/{}", self.endpoint, method))
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlatformError::Transport(e.without_url().to_string()))?;

        match serde_json::from_slice::<BotApiResponse<T>>(&bytes) {
            Ok(envelope) if envelope.ok => envelope.result.ok_or_else(|| {
                PlatformError::InvalidResponse(format!("{} returned no result", method))
            }),
            Ok(envelope) => {
                let description = envelope
                    .description
                    .unwrap_or_else(|| format!("{} failed", method));
                tracing::warn!(
                    method,
                    error_code = envelope.error_code,
                    description = %description,
                    "Telegram API rejected call"
                );
                Err(PlatformError::Rejected {
                    code: envelope.error_code,
                    description,
                })
            }
            Err(_) if !status.is_success() => Err(PlatformError::Http(status.as_u16())),
            Err(e) => Err(PlatformError::InvalidResponse(format!("{}: {}", method, e))),
        }
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn approve_join_request(&self, chat_id: i64, user_id: i64) -> Result<(), PlatformError> {
        let _: bool = self
            .call(
                "approveChatJoinRequest",
                json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await?;
        tracing::info!(chat_id, user_id, "Join request approved on Telegram");
        Ok(())
    }

    async fn send_direct_message(&self, user_id: i64, text: &str) -> Result<(), PlatformError> {
        let _: Value = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": user_id,
                    "text": text,
                    "parse_mode": "MarkdownV2",
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(())
    }

    async fn get_chat_info(&self, chat_id: i64) -> Result<ChatInfo, PlatformError> {
        let chat: TelegramChat = self.call("getChat", json!({ "chat_id": chat_id })).await?;
        Ok(ChatInfo {
            id: chat.id,
            title: chat.title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::StatusCode,
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use domain::models::ApprovalFailure;

    async fn bot_api(Path((bot, method)): Path<(String, String)>, Json(body): Json<Value>) -> impl IntoResponse {
        if bot != "bot123:ABC" {
            return (StatusCode::NOT_FOUND, "no such bot".to_string());
        }
        let reply = match method.as_str() {
            "approveChatJoinRequest" if body["user_id"] == 7 => json!({"ok": true, "result": true}),
            "approveChatJoinRequest" => json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: HIDE_REQUESTER_MISSING"
            }),
            "sendMessage" => json!({"ok": true, "result": {"message_id": 1}}),
            "getChat" => json!({"ok": true, "result": {"id": body["chat_id"], "title": "Rust Club", "type": "supergroup"}}),
            _ => return (StatusCode::BAD_GATEWAY, "gateway".to_string()),
        };
        (StatusCode::OK, reply.to_string())
    }

    async fn client() -> TelegramClient {
        let app = Router::new().route("/:bot/:method", post(bot_api));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TelegramClient::new(&TelegramConfig {
            bot_token: "123:ABC".into(),
            api_base_url: format!("http://{}/", addr),
            timeout_secs: 5,
            webhook_secret: String::new(),
            send_welcome_message: true,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_approve_success() {
        assert!(client().await.approve_join_request(-100, 7).await.is_ok());
    }

    #[tokio::test]
    async fn test_approve_rejection_is_classified() {
        let err = client().await.approve_join_request(-100, 8).await.unwrap_err();
        assert!(matches!(err, PlatformError::Rejected { code: Some(400), .. }));
        assert_eq!(err.classify(), ApprovalFailure::RequestNotFoundUpstream);
    }

    #[tokio::test]
    async fn test_get_chat_info() {
        let info = client().await.get_chat_info(-100).await.unwrap();
        assert_eq!(info.id, -100);
        assert_eq!(info.title.as_deref(), Some("Rust Club"));
    }

    #[tokio::test]
    async fn test_send_message() {
        assert!(client().await.send_direct_message(7, "hi").await.is_ok());
    }

    #[tokio::test]
    async fn test_non_json_error_is_http() {
        let err = client().await.call::<Value>("unknownMethod", json!({})).await.unwrap_err();
        assert_eq!(err, PlatformError::Http(502));
    }

    #[test]
    fn test_update_decodes_join_request() {
        let raw = json!({
            "update_id": 10,
            "chat_join_request": {
                "chat": {"id": -1001, "title": "Rust Club", "type": "supergroup"},
                "from": {"id": 42, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "user_chat_id": 42,
                "date": 1760000000
            }
        });
        let update: Update = serde_json::from_value(raw).unwrap();
        let request = update.chat_join_request.unwrap();
        assert_eq!(request.chat.id, -1001);
        assert_eq!(request.from.username.as_deref(), Some("ada"));
        assert!(request.from.last_name.is_none());
    }

    #[test]
    fn test_update_without_join_request() {
        let update: Update =
            serde_json::from_value(json!({"update_id": 11, "message": {"text": "hi"}})).unwrap();
        assert!(update.chat_join_request.is_none());
    }

    #[test]
    fn test_verification_prompt_escapes_title() {
        let text = verification_prompt(Some("Rust (Official)"), "https://g.example/verify?token=abc", 10);
        assert!(text.contains("*Rust \\(Official\\)*"));
        assert!(text.contains("(https://g.example/verify?token=abc)"));
        assert!(text.contains("10 minutes\\."));
    }
}
