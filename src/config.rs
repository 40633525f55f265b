//! Server configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `MASKBOT_*` environment variables.

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::images::MaskSelection;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "MASKBOT_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("telegram_token is required")]
    MissingTelegramToken,

    #[error("openai_api_key is required")]
    MissingOpenAiKey,

    #[error("at least one entry in mask_urls is required")]
    NoMasks,
}

/// Server configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// SQLite file; None = in-memory
    pub db_path: Option<String>,
    pub telegram_token: String,
    pub telegram_api_url: String,
    pub openai_api_key: String,
    pub openai_api_url: String,
    pub image_model: String,
    /// Images requested per generation
    pub variations: u32,
    /// Overlay asset locators
    pub mask_urls: Vec<String>,
    pub mask_selection: MaskSelection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: None,
            telegram_token: String::new(),
            telegram_api_url: "https://api.telegram.org".to_string(),
            openai_api_key: String::new(),
            openai_api_url: "https://api.openai.com/v1".to_string(),
            image_model: "gpt-image-1".to_string(),
            variations: 3,
            mask_urls: Vec::new(),
            mask_selection: MaskSelection::Random,
        }
    }
}

// Tokens stay out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("telegram_api_url", &self.telegram_api_url)
            .field("openai_api_url", &self.openai_api_url)
            .field("image_model", &self.image_model)
            .field("variations", &self.variations)
            .field("mask_urls", &self.mask_urls)
            .field("mask_selection", &self.mask_selection)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load defaults, then `file` (if given), then the environment
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(file)
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Check everything needed to talk to the collaborators is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::MissingTelegramToken);
        }
        if self.openai_api_key.trim().is_empty() {
            return Err(ConfigError::MissingOpenAiKey);
        }
        if self.mask_urls.is_empty() {
            return Err(ConfigError::NoMasks);
        }
        Ok(())
    }
}
