//! maskbot - webhook chat bot that applies an overlay mask to user photos
//!
//! Photos arrive as Telegram webhook updates, are sent with a mask asset to
//! an image-generation API, and the results are posted back to the chat.
//! Each user gets a fixed number of generations, tracked in a key-value store.

pub mod api;
pub mod bot;
pub mod config;
pub mod db;
pub mod images;
pub mod kv;
pub mod openai;
pub mod session;
pub mod telegram;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub use config::Config;

use api::AppState;
use db::Database;
use images::MaskCatalog;
use kv::{KvStore, SqliteKv};
use openai::{ImageGenerator, OpenAiClient};
use session::SessionStore;
use telegram::{ChatTransport, TelegramClient};

/// The maskbot server instance
pub struct Server {
    config: Config,
    state: AppState,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a server talking to the real Telegram and OpenAI APIs
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let masks = MaskCatalog::new(config.mask_urls.clone(), config.mask_selection)
            .context("no overlay assets configured")?;
        let transport = TelegramClient::new(&config.telegram_token, &config.telegram_api_url)?;
        let generator = OpenAiClient::new(
            &config.openai_api_key,
            &config.openai_api_url,
            &config.image_model,
            config.variations,
            masks,
        )?;

        Self::with_services(config, Arc::new(transport), Arc::new(generator)).await
    }

    /// Create a server with the given collaborators
    pub async fn with_services(
        config: Config,
        transport: Arc<dyn ChatTransport>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Result<Self> {
        let db = Database::new(config.db_path.as_deref()).await?;
        let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::new(db.pool().clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            state: AppState {
                kv,
                transport,
                generator,
            },
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Session store over the server's key-value store
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.state.kv.clone())
    }

    /// Run the server until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("maskbot listening on {}", local_addr);

        let router = api::router(self.state.clone());
        let mut shutdown_rx = self.shutdown_rx.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;

        info!("maskbot shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
