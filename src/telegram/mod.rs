//! Telegram Bot API client.
//!
//! Thin typed wrapper over the HTTP API: everything the orchestrator needs
//! to acknowledge, report progress, deliver audio and clean up after a
//! request. Delivery failures carry a structured kind so callers classify
//! outcomes without sniffing error strings.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the Telegram client
#[derive(Debug, Error)]
pub enum TelegramError {
    /// The API answered with ok=false (or a non-JSON error body).
    #[error("telegram API error {code}: {description}")]
    Api { code: u16, description: String },

    /// Transport-level failure before a response could be read.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The audio file could not be read from disk for upload.
    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
}

impl TelegramError {
    /// Transient network fault, safe to drop for best-effort deliveries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Platform rejected the payload for exceeding its size ceiling.
    pub fn is_payload_too_large(&self) -> bool {
        match self {
            Self::Api { code: 413, .. } => true,
            Self::Api { description, .. } => description.contains("Request Entity Too Large"),
            _ => false,
        }
    }
}

/// Response envelope shared by all Bot API methods
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    message_id: i64,
}

/// An inbound update delivered to the webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

/// An inbound chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

/// A message entity annotation (Telegram offsets are UTF-16 code units).
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default)]
    pub url: Option<String>,
}

impl Message {
    /// First URL carried by the message, via `url` or `text_link` entities.
    pub fn first_url(&self) -> Option<String> {
        for entity in &self.entities {
            match entity.kind.as_str() {
                "url" => {
                    if let Some(text) = &self.text {
                        if let Some(url) = slice_utf16(text, entity.offset, entity.length) {
                            return Some(url);
                        }
                    }
                }
                "text_link" => {
                    if let Some(url) = &entity.url {
                        return Some(url.clone());
                    }
                }
                _ => {}
            }
        }
        None
    }
}

fn slice_utf16(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let slice = units.get(offset..offset.checked_add(length)?)?;
    String::from_utf16(slice).ok()
}

/// Telegram Bot API client
pub struct TelegramClient {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramClient {
    /// Create a new client for the given bot token.
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TelegramError> {
        let status = response.status().as_u16();
        let body = response.text().await?;

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) if envelope.ok => envelope.result.ok_or(TelegramError::Api {
                code: status,
                description: "response has no result".to_string(),
            }),
            Ok(envelope) => Err(TelegramError::Api {
                code: envelope.error_code.unwrap_or(status),
                description: envelope.description.unwrap_or_default(),
            }),
            // Not the Bot API envelope (e.g. a proxy error page); surface the
            // HTTP status so callers can still classify it.
            Err(_) => Err(TelegramError::Api {
                code: status,
                description: body.chars().take(200).collect(),
            }),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, TelegramError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Send an HTML message; returns the new message id.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64, TelegramError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(message_id) = reply_to {
            body["reply_to_message_id"] = json!(message_id);
        }

        let message: MessageRef = self.call("sendMessage", body).await?;
        Ok(message.message_id)
    }

    /// Replace the text of an existing message.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        self.call::<serde_json::Value>("editMessageText", body)
            .await?;
        Ok(())
    }

    /// Delete a message.
    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id });
        self.call::<bool>("deleteMessage", body).await?;
        Ok(())
    }

    /// Upload an audio file with an HTML caption; returns the message id.
    pub async fn send_audio(
        &self,
        chat_id: i64,
        audio_path: &Path,
        duration: Option<u32>,
        caption: &str,
        reply_to: Option<i64>,
    ) -> Result<i64, TelegramError> {
        let file_name = audio_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let file_bytes = tokio::fs::read(audio_path).await?;

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("audio", file_part);

        if let Some(seconds) = duration {
            form = form.text("duration", seconds.to_string());
        }
        if let Some(message_id) = reply_to {
            form = form.text("reply_to_message_id", message_id.to_string());
        }

        let response = self
            .client
            .post(self.api_url("sendAudio"))
            .multipart(form)
            .send()
            .await?;

        let message: MessageRef = Self::decode(response).await?;
        Ok(message.message_id)
    }

    /// Register the public webhook URL with Telegram.
    pub async fn set_webhook(&self, url: &str) -> Result<(), TelegramError> {
        let body = json!({ "url": url });
        self.call::<bool>("setWebhook", body).await?;
        Ok(())
    }
}
