//! Command listener: turns `/register` in a private chat into a fresh notify link.
//!
//! The platform adapter pushes `IncomingUpdate`s into a channel; this loop
//! drains it strictly one update at a time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, Token},
    messaging::{
        port::MessagingPort,
        types::{ChatKind, Command, IncomingUpdate},
    },
    registry::Registry,
};

pub const REGISTER_COMMAND: &str = "register";

pub const REGISTRATION_FAILED: &str = "Registration failed, please try again later.";

/// Builds notify URLs from the configured base.
#[derive(Clone, Debug)]
pub struct NotifyLinks {
    base_url: String,
}

impl NotifyLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, token: &Token) -> String {
        format!("{}/{}", self.base_url, token)
    }

    pub fn registration_reply(&self, token: &Token) -> String {
        format!(
            "You will now receive a message in this chat whenever this URL is requested:\n\
{}?message=your+message+here\n\n\
You can replace the last part with your message\n\n\
If you /register again you will receive a new ID and invalidate the old one",
            self.url_for(token)
        )
    }
}

/// What the listener did with one update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Ignored,
    Registered { chat_id: ChatId, token: Token },
    Failed { chat_id: ChatId },
}

pub struct CommandListener {
    registry: Arc<Registry>,
    messenger: Arc<dyn MessagingPort>,
    links: NotifyLinks,
    bot_username: Option<String>,
}

impl CommandListener {
    pub fn new(
        registry: Arc<Registry>,
        messenger: Arc<dyn MessagingPort>,
        links: NotifyLinks,
    ) -> Self {
        Self {
            registry,
            messenger,
            links,
            bot_username: None,
        }
    }

    /// Username from the platform handshake; commands addressed to any other
    /// bot are ignored.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    /// Drain `updates` until the channel closes or `cancel` fires.
    pub async fn run(self, mut updates: mpsc::Receiver<IncomingUpdate>, cancel: CancellationToken) {
        info!("command listener started");
        loop {
            let update = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = updates.recv() => match next {
                    Some(update) => update,
                    None => break,
                },
            };
            self.handle(update).await;
        }
        info!("command listener stopped");
    }

    pub async fn handle(&self, update: IncomingUpdate) -> Dispatch {
        let Some((chat_id, cmd)) = self.private_command(&update) else {
            return Dispatch::Ignored;
        };

        match cmd.name.as_str() {
            REGISTER_COMMAND => self.register(chat_id).await,
            other => {
                debug!(chat_id = %chat_id, command = other, "ignoring command");
                Dispatch::Ignored
            }
        }
    }

    fn private_command(&self, update: &IncomingUpdate) -> Option<(ChatId, Command)> {
        let IncomingUpdate::Message(msg) = update else {
            return None;
        };
        let chat = msg.chat?;
        if chat.kind != ChatKind::Private || !msg.is_command {
            return None;
        }
        let cmd = Command::parse(msg.text.as_deref()?)?;
        if !cmd.is_addressed_to(self.bot_username.as_deref()) {
            return None;
        }
        Some((chat.id, cmd))
    }

    async fn register(&self, chat_id: ChatId) -> Dispatch {
        let token = match self.registry.register(chat_id).await {
            Ok(token) => token,
            Err(e) => {
                warn!(chat_id = %chat_id, "registration failed: {e}");
                self.reply(chat_id, REGISTRATION_FAILED).await;
                return Dispatch::Failed { chat_id };
            }
        };

        self.reply(chat_id, &self.links.registration_reply(&token))
            .await;
        Dispatch::Registered { chat_id, token }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.messenger.send_text(chat_id, text).await {
            warn!(chat_id = %chat_id, "failed to send reply: {e}");
        }
    }
}
