use async_trait::async_trait;

use crate::{
    domain::ChatId,
    Result,
};

/// Cross-messenger port.
///
/// The notify endpoint and the command listener only ever need to push plain
/// text into a chat; formatting is the caller's business.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;
}
