//! OpenAI image generation
//!
//! Provides:
//! - `ImageGenerator` trait used by the dispatcher
//! - `OpenAiClient`: sends the user's photo plus an overlay asset to the
//!   `images/edits` endpoint and returns the generated images

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::images::{ImagePayload, MaskCatalog};

/// Generation errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to download overlay asset: HTTP {0}")]
    MaskDownload(u16),

    #[error("image API error: HTTP {0}")]
    Status(u16),

    #[error("invalid base64 image: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("no images generated")]
    NoImages,
}

/// Produces edited images from a user photo and an instruction prompt
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        photo: &[u8],
        prompt: &str,
    ) -> Result<Vec<ImagePayload>, GenerationError>;
}

/// Images edit response
#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

impl ImageResponse {
    /// Convert items to payloads, skipping items with neither field
    fn into_payloads(self) -> Result<Vec<ImagePayload>, GenerationError> {
        let mut images = Vec::with_capacity(self.data.len());
        for (i, item) in self.data.into_iter().enumerate() {
            if let Some(url) = item.url {
                debug!("Generated image {} at URL {}", i + 1, url);
                images.push(ImagePayload::Url(url));
            } else if let Some(encoded) = item.b64_json {
                let bytes = BASE64.decode(encoded.as_bytes())?;
                debug!("Generated image {} inline ({} bytes)", i + 1, bytes.len());
                images.push(ImagePayload::Bytes(bytes));
            } else {
                warn!("Generated image {} has neither url nor b64_json", i + 1);
            }
        }

        if images.is_empty() {
            return Err(GenerationError::NoImages);
        }
        Ok(images)
    }
}

/// OpenAI images client
#[derive(Debug)]
pub struct OpenAiClient {
    /// HTTP client
    client: Client,
    /// API key
    api_key: String,
    /// API base URL
    base_url: String,
    /// Model name, e.g. gpt-image-1
    model: String,
    /// Images requested per generation
    variations: u32,
    /// Overlay assets
    masks: MaskCatalog,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        variations: u32,
        masks: MaskCatalog,
    ) -> Result<Self, GenerationError> {
        // Image edits routinely take tens of seconds
        let client = Client::builder().timeout(Duration::from_secs(180)).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            variations: variations.max(1),
            masks,
        })
    }

    /// Download the overlay asset for this generation
    async fn fetch_mask(&self) -> Result<Vec<u8>, GenerationError> {
        let url = self.masks.pick();
        debug!("Downloading overlay asset {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GenerationError::MaskDownload(response.status().as_u16()));
        }

        let bytes = response.bytes().await?;
        debug!("Overlay asset is {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(
        &self,
        photo: &[u8],
        prompt: &str,
    ) -> Result<Vec<ImagePayload>, GenerationError> {
        let mask = self.fetch_mask().await?;

        let form = Form::new()
            .text("model", self.model.clone())
            .text("prompt", prompt.to_string())
            .text("n", self.variations.to_string())
            .part(
                "image[]",
                Part::bytes(photo.to_vec())
                    .file_name("user.jpg")
                    .mime_str("image/jpeg")?,
            )
            .part(
                "image[]",
                Part::bytes(mask)
                    .file_name("mask.png")
                    .mime_str("image/png")?,
            );

        info!(
            "Requesting {} image(s) from {} ({} byte photo)",
            self.variations,
            self.model,
            photo.len()
        );

        let response = self
            .client
            .post(format!("{}/images/edits", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("OpenAI API error: {} - {}", status, body);
            return Err(GenerationError::Status(status.as_u16()));
        }

        let image_response: ImageResponse = response.json().await?;
        let images = image_response.into_payloads()?;
        info!("Received {} generated image(s)", images.len());
        Ok(images)
    }
}
