//! Slack Web API client.
//!
//! Covers the three calls the relay needs: post the placeholder reply, edit it
//! in place, and look up a user's display name for request metadata.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

/// Result type for Slack operations.
pub type SlackResult<T> = Result<T, SlackError>;

/// Errors that can occur when talking to the Slack Web API.
#[derive(Debug, Error)]
pub enum SlackError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Slack accepted the request but returned `ok: false`.
    #[error("Slack API error from {method}: {error}")]
    Api { method: String, error: String },

    /// Response body didn't have the expected shape.
    #[error("Failed to parse {method} response: {message}")]
    Parse { method: String, message: String },
}

/// Handle of a posted message; every later edit targets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel: String,
    pub ts: String,
}

/// Outbound chat operations consumed by the relay.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Post a new message, returning the handle edits will target.
    async fn post_message(&self, channel: &str, text: &str) -> SlackResult<MessageHandle>;

    /// Replace the text of an existing message. Idempotent: same handle,
    /// latest text wins.
    async fn update_message(&self, handle: &MessageHandle, text: &str) -> SlackResult<()>;

    /// Look up a user's real name.
    async fn user_real_name(&self, user_id: &str) -> SlackResult<String>;
}

/// Client for the Slack Web API.
#[derive(Debug, Clone)]
pub struct SlackClient {
    client: Client,
    base_url: String,
    bot_token: String,
}

impl SlackClient {
    /// Create a new Slack client.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_base_url(bot_token, "https://slack.com/api")
    }

    /// Create a client against a custom API base URL (for testing).
    pub fn with_base_url(bot_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            bot_token: bot_token.into(),
        }
    }

    async fn call(&self, method: &str, body: Value) -> SlackResult<Value> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?;

        let data: Value = response.json().await.map_err(|e| SlackError::Parse {
            method: method.to_string(),
            message: e.to_string(),
        })?;

        if data["ok"].as_bool() != Some(true) {
            return Err(SlackError::Api {
                method: method.to_string(),
                error: data["error"].as_str().unwrap_or("unknown").to_string(),
            });
        }

        Ok(data)
    }
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> SlackResult<MessageHandle> {
        let data = self
            .call(
                "chat.postMessage",
                json!({ "channel": channel, "text": text }),
            )
            .await?;

        let ts = data["ts"]
            .as_str()
            .or_else(|| data["message"]["ts"].as_str())
            .ok_or_else(|| SlackError::Parse {
                method: "chat.postMessage".to_string(),
                message: "missing ts in response".to_string(),
            })?;
        let channel = data["channel"].as_str().unwrap_or(channel);

        Ok(MessageHandle {
            channel: channel.to_string(),
            ts: ts.to_string(),
        })
    }

    async fn update_message(&self, handle: &MessageHandle, text: &str) -> SlackResult<()> {
        self.call(
            "chat.update",
            json!({ "channel": handle.channel, "ts": handle.ts, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn user_real_name(&self, user_id: &str) -> SlackResult<String> {
        let url = format!("{}/users.info?user={}", self.base_url, user_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bot_token)
            .send()
            .await?;

        let data: Value = response.json().await.map_err(|e| SlackError::Parse {
            method: "users.info".to_string(),
            message: e.to_string(),
        })?;

        if data["ok"].as_bool() != Some(true) {
            return Err(SlackError::Api {
                method: "users.info".to_string(),
                error: data["error"].as_str().unwrap_or("unknown").to_string(),
            });
        }

        let name = data["user"]["real_name"]
            .as_str()
            .or_else(|| data["user"]["profile"]["real_name"].as_str())
            .or_else(|| data["user"]["name"].as_str())
            .unwrap_or(user_id);

        Ok(name.to_string())
    }
}
