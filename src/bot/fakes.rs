//! Recording collaborators for dispatcher tests

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::images::ImagePayload;
use crate::openai::{GenerationError, ImageGenerator};
use crate::telegram::{ChatTransport, File, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(String),
    Photo(ImagePayload),
}

#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<Sent>>,
    answered: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
    photo_calls: AtomicUsize,
    fail_photo: Mutex<Option<usize>>,
    fail_get_file: Mutex<bool>,
    fail_text: Mutex<Option<String>>,
}

impl FakeTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                Sent::Photo(_) => None,
            })
            .collect()
    }

    pub fn photos(&self) -> Vec<ImagePayload> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Photo(p) => Some(p),
                Sent::Text(_) => None,
            })
            .collect()
    }

    pub fn answered(&self) -> Vec<String> {
        self.answered.lock().clone()
    }

    pub fn fetched_files(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    /// Make the n-th (1-based) `send_photo` call fail
    pub fn fail_photo_number(&self, n: usize) {
        *self.fail_photo.lock() = Some(n);
    }

    pub fn fail_get_file(&self) {
        *self.fail_get_file.lock() = true;
    }

    /// Make every `send_message` whose text contains `needle` fail
    pub fn fail_text_containing(&self, needle: &str) {
        *self.fail_text.lock() = Some(needle.to_string());
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send_message(&self, _chat_id: i64, text: &str) -> Result<(), TransportError> {
        if let Some(needle) = self.fail_text.lock().as_deref() {
            if text.contains(needle) {
                return Err(TransportError::Status {
                    method: "sendMessage".into(),
                    status: 502,
                });
            }
        }
        self.sent.lock().push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, _chat_id: i64, photo: &ImagePayload) -> Result<(), TransportError> {
        let n = self.photo_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_photo.lock() == Some(n) {
            return Err(TransportError::Api {
                method: "sendPhoto".into(),
                description: "Bad Request: wrong file identifier".into(),
            });
        }
        self.sent.lock().push(Sent::Photo(photo.clone()));
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<File, TransportError> {
        if *self.fail_get_file.lock() {
            return Err(TransportError::Api {
                method: "getFile".into(),
                description: "Bad Request: invalid file_id".into(),
            });
        }
        self.fetched.lock().push(file_id.to_string());
        Ok(File {
            file_id: file_id.to_string(),
            file_size: Some(3),
            file_path: Some(format!("photos/{}.jpg", file_id)),
        })
    }

    async fn download_file(&self, _file_path: &str) -> Result<Vec<u8>, TransportError> {
        Ok(vec![0xff, 0xd8, 0xff])
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TransportError> {
        self.answered.lock().push(callback_query_id.to_string());
        Ok(())
    }
}

pub struct FakeGenerator {
    images: usize,
    fail_status: Option<u16>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    /// Returns `n` URL images per call
    pub fn urls(n: usize) -> Self {
        Self {
            images: n,
            fail_status: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every call with the given HTTP status
    pub fn failing(status: u16) -> Self {
        Self {
            images: 0,
            fail_status: Some(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(
        &self,
        _photo: &[u8],
        _prompt: &str,
    ) -> Result<Vec<ImagePayload>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.fail_status {
            return Err(GenerationError::Status(status));
        }
        Ok((0..self.images)
            .map(|i| ImagePayload::Url(format!("https://img.example/{}.png", i)))
            .collect())
    }
}
