/// Core error type for the notify bot.
///
/// Adapter crates should map their specific errors into this type so the HTTP
/// endpoint and the command listener can handle failures consistently
/// (not-found vs internal failure).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    /// No registration exists for the token. Callers must not reveal whether
    /// the token was malformed or merely unknown.
    #[error("unknown token")]
    UnknownToken,

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
