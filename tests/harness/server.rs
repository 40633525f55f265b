//! BotTest - end-to-end harness
//!
//! Starts a real `Server` configured against a wiremock server that answers
//! the Telegram Bot API, serves the overlay asset, and (per test) the OpenAI
//! images endpoint. Outbound traffic is inspected through the mock's
//! request journal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use maskbot::session::SessionStore;
use maskbot::{Config, Server};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bot token used for every test server
pub const TOKEN: &str = "4242:TEST";

/// Test harness that runs the bot against mocked upstream APIs
pub struct BotTest {
    pub addr: SocketAddr,
    pub client: Client,
    pub upstream: MockServer,
    server: Arc<Server>,
    _handle: JoinHandle<()>,
}

impl BotTest {
    /// Start with an in-memory database
    pub async fn start() -> Result<Self> {
        Self::start_with_db(None).await
    }

    /// Start with an optional on-disk database
    pub async fn start_with_db(db_path: Option<String>) -> Result<Self> {
        let upstream = MockServer::start().await;
        mount_telegram(&upstream).await;

        // Find a random available port
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let config = Config {
            bind_addr: addr,
            db_path,
            telegram_token: TOKEN.to_string(),
            telegram_api_url: upstream.uri(),
            openai_api_key: "sk-test".to_string(),
            openai_api_url: format!("{}/v1", upstream.uri()),
            variations: 1,
            mask_urls: vec![format!("{}/assets/mask1.png", upstream.uri())],
            ..Default::default()
        };

        let server = Arc::new(Server::new(config).await?);
        let server_clone = server.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = server_clone.run().await {
                eprintln!("Server error: {}", e);
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        // Poll until server is ready (max 2 seconds)
        let mut ready = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
        }

        if !ready {
            panic!("Server failed to start within 2 seconds");
        }

        Ok(Self {
            addr,
            client,
            upstream,
            server,
            _handle: handle,
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// POST an update to the webhook
    pub async fn post_update(&self, update: &Value) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}/webhook", self.base_url()))
            .json(update)
            .send()
            .await?)
    }

    /// Make the image API answer with `response`
    pub async fn mount_generation(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/v1/images/edits"))
            .respond_with(response)
            .mount(&self.upstream)
            .await;
    }

    /// Image API answers with the given image URLs
    pub async fn mount_generated_urls(&self, urls: &[&str]) {
        let data: Vec<Value> = urls.iter().map(|u| json!({ "url": u })).collect();
        self.mount_generation(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
            .await;
    }

    /// Session store backed by the server's database
    pub fn sessions(&self) -> SessionStore {
        self.server.sessions()
    }

    async fn requests_to(&self, suffix: &str) -> Vec<wiremock::Request> {
        self.upstream
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path().ends_with(suffix))
            .collect()
    }

    /// Texts sent through sendMessage, in order
    pub async fn texts_sent(&self) -> Vec<String> {
        self.requests_to("/sendMessage")
            .await
            .iter()
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .filter_map(|body| body["text"].as_str().map(str::to_string))
            .collect()
    }

    /// Number of sendPhoto calls
    pub async fn photos_sent(&self) -> usize {
        self.requests_to("/sendPhoto").await.len()
    }

    /// Raw sendPhoto requests
    pub async fn photo_requests(&self) -> Vec<wiremock::Request> {
        self.requests_to("/sendPhoto").await
    }

    /// Number of calls to the image API
    pub async fn generation_calls(&self) -> usize {
        self.requests_to("/images/edits").await.len()
    }

    /// Paths fetched via getFile
    pub async fn files_resolved(&self) -> Vec<String> {
        self.requests_to("/getFile")
            .await
            .iter()
            .filter_map(|r| {
                r.url
                    .query_pairs()
                    .find(|(k, _)| k == "file_id")
                    .map(|(_, v)| v.to_string())
            })
            .collect()
    }

    /// Callback ids acknowledged via answerCallbackQuery
    pub async fn callbacks_answered(&self) -> Vec<String> {
        self.requests_to("/answerCallbackQuery")
            .await
            .iter()
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .filter_map(|body| body["callback_query_id"].as_str().map(str::to_string))
            .collect()
    }

    /// Shutdown the server gracefully
    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}

impl Drop for BotTest {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

/// Telegram endpoints and the overlay asset, always succeeding
async fn mount_telegram(upstream: &MockServer) {
    let ok = |result: Value| {
        ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": result}))
    };

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", TOKEN)))
        .respond_with(ok(json!({"message_id": 100})))
        .mount(upstream)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendPhoto", TOKEN)))
        .respond_with(ok(json!({"message_id": 101})))
        .mount(upstream)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/answerCallbackQuery", TOKEN)))
        .respond_with(ok(json!(true)))
        .mount(upstream)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/bot{}/getFile", TOKEN)))
        .respond_with(ok(json!({
            "file_id": "photo-large",
            "file_size": 4,
            "file_path": "photos/file_0.jpg"
        })))
        .mount(upstream)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/file/bot{}/photos/file_0.jpg", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xffu8, 0xd8, 0xff, 0xe0]))
        .mount(upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/assets/mask1.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89u8, b'P', b'N', b'G']))
        .mount(upstream)
        .await;
}
