//! In-memory fakes for the core ports.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, Token},
    errors::Error,
    messaging::port::MessagingPort,
    store::TokenStore,
    Result,
};

#[derive(Default)]
struct Maps {
    by_chat: HashMap<ChatId, Token>,
    by_token: HashMap<Token, ChatId>,
}

#[derive(Default)]
pub struct MemoryStore {
    maps: Mutex<Maps>,
    fail_writes: AtomicBool,
    failing_chat: Mutex<Option<ChatId>>,
}

impl MemoryStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail writes touching `chat_id` only.
    pub fn fail_writes_for(&self, chat_id: ChatId) {
        *self.failing_chat.lock().unwrap() = Some(chat_id);
    }

    pub fn len(&self) -> usize {
        let maps = self.maps.lock().unwrap();
        assert_eq!(maps.by_chat.len(), maps.by_token.len());
        maps.by_chat.len()
    }

    fn check_writable(&self, chat_id: ChatId) -> Result<()> {
        let failing = *self.failing_chat.lock().unwrap() == Some(chat_id);
        if failing || self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk on fire".to_string()));
        }
        Ok(())
    }
}

impl TokenStore for MemoryStore {
    fn put(&self, chat_id: ChatId, token: &Token) -> Result<()> {
        self.check_writable(chat_id)?;
        let mut maps = self.maps.lock().unwrap();
        if let Some(old) = maps.by_chat.insert(chat_id, token.clone()) {
            maps.by_token.remove(&old);
        }
        if let Some(old_chat) = maps.by_token.insert(token.clone(), chat_id) {
            if old_chat != chat_id {
                maps.by_chat.remove(&old_chat);
            }
        }
        Ok(())
    }

    fn get_chat(&self, token: &Token) -> Result<ChatId> {
        let maps = self.maps.lock().unwrap();
        maps.by_token.get(token).copied().ok_or(Error::UnknownToken)
    }

    fn delete(&self, chat_id: ChatId) -> Result<()> {
        self.check_writable(chat_id)?;
        let mut maps = self.maps.lock().unwrap();
        if let Some(token) = maps.by_chat.remove(&chat_id) {
            maps.by_token.remove(&token);
        }
        Ok(())
    }

    fn token_for(&self, chat_id: ChatId) -> Result<Option<Token>> {
        let maps = self.maps.lock().unwrap();
        Ok(maps.by_chat.get(&chat_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    pub sent: Mutex<Vec<(ChatId, String)>>,
    pub fail: AtomicBool,
}

impl FakeMessenger {
    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::External("telegram error: bot was blocked".to_string()));
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}
