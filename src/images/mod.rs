//! Image payloads and overlay assets
//!
//! Provides:
//! - `ImagePayload`: an image either as a remote locator or as raw bytes
//! - `MaskCatalog`: the fixed set of overlay assets and how one is picked

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

/// An image that can be handed to the chat transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Remote address the transport fetches itself
    Url(String),
    /// Encoded image bytes (PNG from the generation API)
    Bytes(Vec<u8>),
}

impl ImagePayload {
    pub fn describe(&self) -> String {
        match self {
            ImagePayload::Url(url) => format!("url {}", url),
            ImagePayload::Bytes(bytes) => format!("{} bytes", bytes.len()),
        }
    }
}

/// How an overlay asset is chosen for each generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskSelection {
    /// Always the first configured asset
    First,
    /// Uniformly at random among configured assets
    #[default]
    Random,
}

/// Overlay assets available to the generation client
#[derive(Debug, Clone)]
pub struct MaskCatalog {
    urls: Vec<String>,
    selection: MaskSelection,
}

impl MaskCatalog {
    /// Returns None when no assets are configured
    pub fn new(urls: Vec<String>, selection: MaskSelection) -> Option<Self> {
        if urls.is_empty() {
            return None;
        }
        Some(Self { urls, selection })
    }

    /// Pick the asset for one generation
    pub fn pick(&self) -> &str {
        let picked = match self.selection {
            MaskSelection::First => self.urls.first(),
            MaskSelection::Random => self.urls.choose(&mut rand::rng()),
        };
        // `new` rejects empty catalogs
        picked.map(String::as_str).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
