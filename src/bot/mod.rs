//! Request dispatcher
//!
//! Interprets one inbound update and drives the per-user state machine:
//!
//! | Event                         | Next state    |
//! |-------------------------------|---------------|
//! | `/start`                      | waiting_photo |
//! | `/help`, `/status`            | unchanged     |
//! | photo, limit reached          | unchanged     |
//! | photo, limit not reached      | processing, then waiting_photo |
//! | callback query                | waiting_photo |
//! | anything else                 | waiting_photo |
//!
//! Every collaborator is reached through the request-scoped `BotContext`.

pub mod messages;

#[cfg(test)]
pub(crate) mod fakes;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::openai::{GenerationError, ImageGenerator};
use crate::session::{SessionError, SessionState, SessionStore, SessionUpdate, UserIdentity};
use crate::telegram::{CallbackQuery, ChatTransport, Message, TransportError, Update, User};

/// Dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("session store: {0}")]
    Session(#[from] SessionError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("generation: {0}")]
    Generation(#[from] GenerationError),

    #[error("message contains no photo sizes")]
    NoPhoto,

    #[error("none of {0} generated images could be delivered")]
    NothingDelivered(usize),
}

/// Handles to the collaborators for one webhook invocation
#[derive(Clone)]
pub struct BotContext {
    pub transport: Arc<dyn ChatTransport>,
    pub generator: Arc<dyn ImageGenerator>,
    pub sessions: SessionStore,
}

/// Recognized text commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
}

impl Command {
    /// Parse the first word of a message; accepts `/start@SomeBot`
    pub fn parse(text: &str) -> Option<Command> {
        let word = text.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        match name {
            "/start" => Some(Command::Start),
            "/help" => Some(Command::Help),
            "/status" => Some(Command::Status),
            _ => None,
        }
    }
}

/// Per-item result of sending generated images
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: Vec<(usize, TransportError)>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// What happened to a photo upload
#[derive(Debug)]
pub enum PhotoOutcome {
    /// Quota exhausted; nothing was generated
    LimitReached,
    /// Images delivered and the generation counted
    Completed(DeliveryReport),
    /// The flow failed and the user got the generic apology
    Failed(DispatchError),
}

fn identity(user: &User) -> UserIdentity {
    UserIdentity::new(user.id, user.username.clone())
}

/// Drives one update through the state machine
pub struct Dispatcher<'a> {
    ctx: &'a BotContext,
}

impl<'a> Dispatcher<'a> {
    pub fn new(ctx: &'a BotContext) -> Self {
        Self { ctx }
    }

    /// Route an update to the message or callback handler
    pub async fn handle_update(&self, update: Update) -> Result<(), DispatchError> {
        if let Some(message) = update.message {
            self.handle_message(&message).await
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(&callback).await
        } else {
            debug!("Ignoring update {} with no message or callback", update.update_id);
            Ok(())
        }
    }

    /// Handle a text or photo message
    pub async fn handle_message(&self, message: &Message) -> Result<(), DispatchError> {
        let Some(from) = message.from.as_ref() else {
            debug!("Ignoring message {} without sender", message.message_id);
            return Ok(());
        };
        let user = identity(from);
        let chat_id = message.chat.id;
        let transport = &self.ctx.transport;
        let sessions = &self.ctx.sessions;

        match message.text.as_deref().and_then(Command::parse) {
            Some(Command::Start) => {
                let usage = sessions.usage(&user).await?;
                transport
                    .send_message(chat_id, &messages::welcome(&usage))
                    .await?;
                sessions
                    .update(&user, SessionUpdate::state(SessionState::WaitingPhoto))
                    .await?;
                return Ok(());
            }
            Some(Command::Help) => {
                let usage = sessions.usage(&user).await?;
                transport
                    .send_message(chat_id, &messages::help(&usage))
                    .await?;
                return Ok(());
            }
            Some(Command::Status) => {
                let usage = sessions.usage(&user).await?;
                transport
                    .send_message(chat_id, &messages::status(&usage))
                    .await?;
                return Ok(());
            }
            None => {}
        }

        if message.photo.is_some() {
            let outcome = self.handle_photo(&user, chat_id, message).await?;
            debug!("Photo from user {} finished: {:?}", user, outcome);
            return Ok(());
        }

        transport.send_message(chat_id, messages::SEND_PHOTO).await?;
        sessions
            .update(&user, SessionUpdate::state(SessionState::WaitingPhoto))
            .await?;
        Ok(())
    }

    /// Handle an inline-keyboard callback
    pub async fn handle_callback(&self, callback: &CallbackQuery) -> Result<(), DispatchError> {
        let user = identity(&callback.from);

        self.ctx
            .transport
            .answer_callback_query(&callback.id)
            .await?;
        self.ctx
            .sessions
            .update(&user, SessionUpdate::state(SessionState::WaitingPhoto))
            .await?;

        match callback.message.as_ref() {
            Some(message) => {
                self.ctx
                    .transport
                    .send_message(message.chat.id, messages::SEND_PHOTO)
                    .await?;
            }
            None => debug!("Callback {} has no originating chat", callback.id),
        }
        Ok(())
    }

    /// Quota check, then the generate-and-deliver sequence
    ///
    /// Failures before the generation is counted are reported to the user and
    /// returned as `PhotoOutcome::Failed`; only errors from the quota
    /// pre-check and the final state reset propagate.
    pub async fn handle_photo(
        &self,
        user: &UserIdentity,
        chat_id: i64,
        message: &Message,
    ) -> Result<PhotoOutcome, DispatchError> {
        let sessions = &self.ctx.sessions;

        let usage = sessions.usage(user).await?;
        if usage.is_exhausted() {
            info!(
                "User {} reached the generation limit ({}/{})",
                user, usage.used, usage.max
            );
            self.ctx
                .transport
                .send_message(chat_id, &messages::limit_reached(&usage))
                .await?;
            return Ok(PhotoOutcome::LimitReached);
        }

        let outcome = match self.process_photo(user, chat_id, message).await {
            Ok(report) => PhotoOutcome::Completed(report),
            Err(e) => {
                error!("Error processing photo from user {}: {}", user, e);
                if let Err(send_err) = self
                    .ctx
                    .transport
                    .send_message(chat_id, messages::FAILURE)
                    .await
                {
                    warn!("Could not send failure notice to {}: {}", chat_id, send_err);
                }
                PhotoOutcome::Failed(e)
            }
        };

        sessions
            .update(user, SessionUpdate::state(SessionState::WaitingPhoto))
            .await?;
        Ok(outcome)
    }

    async fn process_photo(
        &self,
        user: &UserIdentity,
        chat_id: i64,
        message: &Message,
    ) -> Result<DeliveryReport, DispatchError> {
        let transport = &self.ctx.transport;
        let sessions = &self.ctx.sessions;

        sessions
            .update(user, SessionUpdate::state(SessionState::Processing))
            .await?;
        transport.send_message(chat_id, messages::PROCESSING).await?;

        let photo = message.largest_photo().ok_or(DispatchError::NoPhoto)?;
        let file = transport.get_file(&photo.file_id).await?;
        let file_path = file
            .file_path
            .ok_or_else(|| TransportError::MissingFilePath(photo.file_id.clone()))?;
        let bytes = transport.download_file(&file_path).await?;
        debug!("User {} photo is {} bytes", user, bytes.len());

        transport
            .send_message(chat_id, messages::APPLYING_MASK)
            .await?;
        let images = self
            .ctx
            .generator
            .generate(&bytes, messages::GENERATION_PROMPT)
            .await?;

        transport
            .send_message(chat_id, &messages::generated(images.len()))
            .await?;

        let mut report = DeliveryReport::default();
        for (i, image) in images.iter().enumerate() {
            match transport.send_photo(chat_id, image).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to deliver image {} ({}) to {}: {}",
                        i + 1,
                        image.describe(),
                        chat_id,
                        e
                    );
                    report.failed.push((i, e));
                }
            }
        }

        if report.delivered == 0 {
            return Err(DispatchError::NothingDelivered(report.attempted()));
        }

        if !sessions.try_increment_generations(user).await? {
            // A concurrent upload consumed the last slot first
            warn!("User {} hit the limit while this generation was running", user);
        }

        // Already counted, so reporting errors are only logged
        if let Err(e) = self.report_completion(user, chat_id, &report).await {
            warn!("Could not send completion notice to {}: {}", chat_id, e);
        }
        Ok(report)
    }

    async fn report_completion(
        &self,
        user: &UserIdentity,
        chat_id: i64,
        report: &DeliveryReport,
    ) -> Result<(), DispatchError> {
        let usage = self.ctx.sessions.usage(user).await?;
        self.ctx
            .transport
            .send_message(chat_id, &messages::completion(&usage, report.failed.len()))
            .await?;

        info!(
            "User {} generation done: {} delivered, {} failed, {}/{} used",
            user,
            report.delivered,
            report.failed.len(),
            usage.used,
            usage.max
        );
        Ok(())
    }
}
