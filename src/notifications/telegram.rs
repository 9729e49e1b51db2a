//! Telegram Bot API sink
//!
//! Posts cards to forum threads, renames threads and rewrites the main
//! chat's description. One attempt per call; failures go back to the caller.

use super::NotificationSink;
use crate::config::TelegramConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Bot API envelope
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatInfo {
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API client bound to one forum group
pub struct TelegramClient {
    /// HTTP client
    client: reqwest::Client,
    /// API base URL, without trailing slash
    api_url: String,
    /// Bot token
    bot_token: SecretString,
    /// Forum group holding the affiliate threads
    group_id: i64,
}

impl TelegramClient {
    /// Create a client from validated config
    pub fn new(config: &TelegramConfig) -> AppResult<Self> {
        let bot_token = config
            .bot_token
            .clone()
            .ok_or_else(|| AppError::Validation("Telegram bot token is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token,
            group_id: config.group_id,
        })
    }

    /// Call a Bot API method and return its `result`
    async fn call(&self, method: &str, payload: Value) -> AppResult<Value> {
        let url = format!(
            "{}/bot{}/{}",
            self.api_url,
            self.bot_token.expose_secret(),
            method
        );

        // reqwest errors carry the URL, which carries the token
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Transport(e.without_url()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Transport(e.without_url()))?;

        let parsed: Option<TelegramResponse> = serde_json::from_slice(&body).ok();

        match parsed {
            Some(r) if status.is_success() && r.ok => Ok(r.result.unwrap_or(Value::Null)),
            Some(r) => Err(AppError::Notification(format!(
                "{} failed ({}): {}",
                method,
                status.as_u16(),
                r.description.unwrap_or_default()
            ))),
            None => Err(AppError::Notification(format!(
                "{} failed ({}): unreadable response of {} bytes",
                method,
                status.as_u16(),
                body.len()
            ))),
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramClient {
    async fn send_message(&self, thread_id: Option<i64>, html: &str) -> AppResult<()> {
        let mut payload = json!({
            "chat_id": self.group_id,
            "text": html,
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
        });
        if let Some(thread_id) = thread_id {
            payload["message_thread_id"] = json!(thread_id);
        }
        self.call("sendMessage", payload).await?;
        Ok(())
    }

    async fn edit_thread_title(&self, thread_id: i64, title: &str) -> AppResult<()> {
        self.call(
            "editForumTopic",
            json!({
                "chat_id": self.group_id,
                "message_thread_id": thread_id,
                "name": title,
            }),
        )
        .await?;
        Ok(())
    }

    async fn chat_description(&self, chat_id: i64) -> AppResult<Option<String>> {
        let result = self.call("getChat", json!({ "chat_id": chat_id })).await?;
        let info: ChatInfo = serde_json::from_value(result).map_err(|e| AppError::Malformed {
            bytes: 0,
            reason: e.to_string(),
        })?;
        Ok(info.description.filter(|d| !d.is_empty()))
    }

    async fn set_chat_description(&self, chat_id: i64, description: &str) -> AppResult<()> {
        self.call(
            "setChatDescription",
            json!({
                "chat_id": chat_id,
                "description": description,
            }),
        )
        .await?;
        Ok(())
    }
}
