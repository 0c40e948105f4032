use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    domain::{ChatId, Token},
    errors::Error,
    store::TokenStore,
    Result,
};

/// Token registry: one live token per chat.
///
/// Composes `TokenStore` calls into the two operations the rest of the system
/// uses. Store calls are synchronous, so they run on tokio's blocking pool.
pub struct Registry {
    store: Arc<dyn TokenStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Issue a fresh token for `chat_id`, invalidating the previous one.
    ///
    /// Concurrent calls for the same chat are last-write-wins: exactly one of
    /// the returned tokens ends up resolvable.
    pub async fn register(&self, chat_id: ChatId) -> Result<Token> {
        let token = Token::generate();

        let store = Arc::clone(&self.store);
        let new_token = token.clone();
        blocking(move || store.replace(chat_id, &new_token)).await?;

        info!(chat_id = %chat_id, token = token.redacted(), "registered chat");
        Ok(token)
    }

    /// Chat owning `token`, or `Error::UnknownToken`.
    pub async fn resolve(&self, token: &Token) -> Result<ChatId> {
        let store = Arc::clone(&self.store);
        let lookup = token.clone();
        let res = blocking(move || store.get_chat(&lookup)).await;

        if let Err(Error::UnknownToken) = &res {
            debug!(token = token.redacted(), "unknown token");
        }
        res
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Storage(format!("store task failed: {e}")))?
}
