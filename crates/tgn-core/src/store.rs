use crate::{
    domain::{ChatId, Token},
    Result,
};

/// Durable `chat <-> token` mapping.
///
/// Every method is one storage transaction: the two directions of the mapping
/// must never be observable out of sync, including after a crash mid-write.
/// Methods are synchronous; async callers should hop onto a blocking thread.
pub trait TokenStore: Send + Sync {
    /// Write `chat -> token` and `token -> chat`, replacing whatever either key
    /// pointed at before.
    fn put(&self, chat_id: ChatId, token: &Token) -> Result<()>;

    /// `Error::UnknownToken` if nothing maps from `token`.
    fn get_chat(&self, token: &Token) -> Result<ChatId>;

    /// Drop the chat's registration in both directions. No-op if absent.
    fn delete(&self, chat_id: ChatId) -> Result<()>;

    /// Current token of a chat, if any.
    fn token_for(&self, chat_id: ChatId) -> Result<Option<Token>>;

    /// Delete-then-put for one chat.
    ///
    /// The default runs two separate transactions; a crash in between leaves the
    /// chat unregistered, never half-registered. Stores that can should
    /// override this with a single transaction.
    fn replace(&self, chat_id: ChatId, token: &Token) -> Result<()> {
        self.delete(chat_id)?;
        self.put(chat_id, token)
    }
}
