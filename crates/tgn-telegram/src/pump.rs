//! Long-poll update pump.
//!
//! Pulls updates with `getUpdates` and forwards them, in order, to the core
//! command listener's channel. Polling errors never end the pump.

use std::time::Duration;

use teloxide::{
    payloads::GetUpdatesSetters,
    prelude::*,
    types::{AllowedUpdate, MessageEntityKind, UpdateKind},
    RequestError,
};
use tokio::{sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tgn_core::{
    domain::ChatId,
    messaging::types::{ChatInfo, ChatKind, IncomingMessage, IncomingUpdate},
};

const ERROR_PAUSE: Duration = Duration::from_secs(5);

pub struct UpdatePump {
    bot: Bot,
    poll_timeout: Duration,
}

impl UpdatePump {
    pub fn new(bot: Bot, poll_timeout: Duration) -> Self {
        Self { bot, poll_timeout }
    }

    /// Poll until `cancel` fires or the listener hangs up.
    pub async fn run(self, tx: mpsc::Sender<IncomingUpdate>, cancel: CancellationToken) {
        info!("starting update loop");
        let timeout = u32::try_from(self.poll_timeout.as_secs()).unwrap_or(u32::MAX);
        let mut offset: i32 = 0;

        loop {
            let req = self
                .bot
                .get_updates()
                .offset(offset)
                .timeout(timeout)
                .allowed_updates(vec![AllowedUpdate::Message]);

            let res = tokio::select! {
                _ = cancel.cancelled() => break,
                res = req.send() => res,
            };

            let pause = match res {
                Ok(updates) => {
                    for update in updates {
                        offset = update.id.saturating_add(1);
                        if tx.send(incoming_from(&update)).await.is_err() {
                            debug!("listener channel closed");
                            return;
                        }
                    }
                    continue;
                }
                Err(RequestError::RetryAfter(d)) => {
                    warn!("telegram asked to retry after {d:?}");
                    d
                }
                Err(e) => {
                    warn!("getUpdates failed: {e}");
                    ERROR_PAUSE
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(pause) => {}
            }
        }
        info!("update loop stopped");
    }
}

/// Platform-neutral view of a Telegram update.
pub fn incoming_from(update: &Update) -> IncomingUpdate {
    match &update.kind {
        UpdateKind::Message(msg) => IncomingUpdate::Message(incoming_message(msg)),
        _ => IncomingUpdate::Other,
    }
}

fn incoming_message(msg: &Message) -> IncomingMessage {
    let chat = &msg.chat;
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_group() {
        ChatKind::Group
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else {
        ChatKind::Channel
    };

    // Same rule as Bot API clients: a command entity at offset 0.
    let is_command = msg
        .entities()
        .map(|entities| {
            entities
                .iter()
                .any(|e| e.offset == 0 && matches!(e.kind, MessageEntityKind::BotCommand))
        })
        .unwrap_or(false);

    IncomingMessage {
        chat: Some(ChatInfo {
            id: ChatId(chat.id.0),
            kind,
        }),
        text: msg.text().map(str::to_string),
        is_command,
    }
}
