//! Telegram adapter (teloxide).
//!
//! This crate implements the `tgn-core` MessagingPort over Telegram Bot API and
//! feeds inbound updates to the core command listener.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::prelude::*;

pub mod auth;
pub mod pump;

use tgn_core::{
    domain::ChatId,
    errors::Error,
    messaging::port::MessagingPort,
    Result,
};

/// Slack on top of the long-poll timeout before the HTTP client gives up.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Bot whose HTTP client outlives a `getUpdates` long poll of `poll_timeout`.
pub fn build_bot(token: &str, poll_timeout: Duration) -> Result<Bot> {
    let client: reqwest::Client = teloxide::net::default_reqwest_settings()
        .timeout(poll_timeout + CLIENT_TIMEOUT_SLACK)
        .build()
        .map_err(|e| Error::External(format!("telegram http client build failed: {e}")))?;
    Ok(Bot::with_client(token, client))
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.bot
            .send_message(Self::tg_chat(chat_id), text.to_string())
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}
