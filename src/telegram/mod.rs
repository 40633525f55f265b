//! Telegram Bot API integration
//!
//! Provides:
//! - Webhook payload types
//! - `ChatTransport` trait used by the dispatcher
//! - `TelegramClient`, the HTTP implementation of it

mod types;

pub use types::{CallbackQuery, Chat, File, Message, PhotoSize, Update, User};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::images::ImagePayload;
use types::ApiResponse;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network failure; the URL is stripped since it embeds the bot token
    #[error("request failed: {0}")]
    Request(reqwest::Error),

    #[error("{method} returned HTTP {status}")]
    Status { method: String, status: u16 },

    #[error("{method} rejected: {description}")]
    Api { method: String, description: String },

    #[error("{0} returned no result")]
    MissingResult(String),

    #[error("no file path for file {0}")]
    MissingFilePath(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.without_url())
    }
}

/// Outbound operations on the chat transport
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    async fn send_photo(&self, chat_id: i64, photo: &ImagePayload) -> Result<(), TransportError>;

    /// Resolve file metadata (including its download path) by id
    async fn get_file(&self, file_id: &str) -> Result<File, TransportError>;

    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, TransportError>;

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TransportError>;
}

/// Telegram Bot API client
#[derive(Debug)]
pub struct TelegramClient {
    client: Client,
    token: String,
    base_url: String,
}

impl TelegramClient {
    /// Create a new client against `base_url` (normally https://api.telegram.org)
    pub fn new(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url, self.token, file_path)
    }

    /// Send a Bot API request and unwrap the `{ok, result}` envelope
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<T, TransportError> {
        debug!("Telegram {}", method);

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Telegram {} unreadable response ({}): {}", method, status, e);
                return Err(TransportError::Status {
                    method: method.to_string(),
                    status: status.as_u16(),
                });
            }
        };

        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| format!("HTTP {}", status));
            warn!("Telegram {} error: {}", method, description);
            return Err(TransportError::Api {
                method: method.to_string(),
                description,
            });
        }

        envelope
            .result
            .ok_or_else(|| TransportError::MissingResult(method.to_string()))
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        let request = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": chat_id, "text": text }));

        self.call::<serde_json::Value>("sendMessage", request).await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, photo: &ImagePayload) -> Result<(), TransportError> {
        let request = match photo {
            ImagePayload::Url(url) => self
                .client
                .post(self.method_url("sendPhoto"))
                .json(&json!({ "chat_id": chat_id, "photo": url })),
            ImagePayload::Bytes(bytes) => {
                let part = Part::bytes(bytes.clone())
                    .file_name("generated-image.png")
                    .mime_str("image/png")?;
                let form = Form::new()
                    .text("chat_id", chat_id.to_string())
                    .part("photo", part);
                self.client
                    .post(self.method_url("sendPhoto"))
                    .multipart(form)
            }
        };

        self.call::<serde_json::Value>("sendPhoto", request).await?;
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<File, TransportError> {
        let request = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)]);

        self.call("getFile", request).await
    }

    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, TransportError> {
        let response = self.client.get(self.file_url(file_path)).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Telegram file download error: {}", status);
            return Err(TransportError::Status {
                method: "download".to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        debug!("Downloaded {} ({} bytes)", file_path, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TransportError> {
        let request = self
            .client
            .post(self.method_url("answerCallbackQuery"))
            .json(&json!({ "callback_query_id": callback_query_id }));

        self.call::<bool>("answerCallbackQuery", request).await?;
        Ok(())
    }
}
