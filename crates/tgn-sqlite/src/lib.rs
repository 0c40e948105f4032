//! SQLite token store (rusqlite).
//!
//! This crate implements the `tgn-core` TokenStore port. One row holds one
//! registration, so the two directions of the mapping live in the same row and
//! every operation is a single transaction.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::info;

use tgn_core::{
    domain::{ChatId, Token},
    errors::Error,
    store::TokenStore,
    Result,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS registrations (
    chat_id INTEGER PRIMARY KEY,
    token   TEXT NOT NULL UNIQUE
);
"#;

pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Open or create the database file and its schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(Self::map_err)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(Self::map_err)?;

        let store = Self::init(conn)?;
        info!("token store opened: {}", path.display());
        Ok(store)
    }

    /// Private in-memory database (tests, throwaway runs).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(Self::map_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(Self::map_err)?;
        conn.execute_batch(SCHEMA).map_err(Self::map_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn map_err(e: rusqlite::Error) -> Error {
        Error::Storage(format!("sqlite error: {e}"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("sqlite connection lock poisoned".to_string()))
    }

    /// Run `f` in one transaction; commit only if it succeeds.
    fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(Self::map_err)?;
        let out = f(&tx).map_err(Self::map_err)?;
        tx.commit().map_err(Self::map_err)?;
        Ok(out)
    }
}

fn put_in(conn: &Connection, chat_id: ChatId, token: &Token) -> rusqlite::Result<()> {
    // Overwrite under either key.
    conn.execute(
        "DELETE FROM registrations WHERE chat_id = ?1 OR token = ?2",
        params![chat_id.0, token.as_str()],
    )?;
    conn.execute(
        "INSERT INTO registrations (chat_id, token) VALUES (?1, ?2)",
        params![chat_id.0, token.as_str()],
    )?;
    Ok(())
}

fn delete_in(conn: &Connection, chat_id: ChatId) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM registrations WHERE chat_id = ?1",
        params![chat_id.0],
    )?;
    Ok(())
}

impl TokenStore for SqliteTokenStore {
    fn put(&self, chat_id: ChatId, token: &Token) -> Result<()> {
        self.with_tx(|tx| put_in(tx, chat_id, token))
    }

    fn get_chat(&self, token: &Token) -> Result<ChatId> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT chat_id FROM registrations WHERE token = ?1",
            params![token.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(Self::map_err)?
        .map(ChatId)
        .ok_or(Error::UnknownToken)
    }

    fn delete(&self, chat_id: ChatId) -> Result<()> {
        self.with_tx(|tx| delete_in(tx, chat_id))
    }

    fn token_for(&self, chat_id: ChatId) -> Result<Option<Token>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT token FROM registrations WHERE chat_id = ?1",
                params![chat_id.0],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(Self::map_err)?;

        match raw {
            None => Ok(None),
            Some(raw) => Token::parse(&raw)
                .map(Some)
                .ok_or_else(|| Error::Storage(format!("corrupt token for chat {chat_id}"))),
        }
    }

    fn replace(&self, chat_id: ChatId, token: &Token) -> Result<()> {
        self.with_tx(|tx| {
            delete_in(tx, chat_id)?;
            put_in(tx, chat_id, token)
        })
    }
}
