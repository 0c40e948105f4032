use std::{
    env, fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::warn;

use crate::{errors::Error, Result};

/// Where the notify endpoint listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenAddr {
    /// Filesystem socket; a stale file is removed before binding.
    Unix(PathBuf),
    /// `host:port`, v4 or v6.
    Tcp(String),
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Unix(path) => write!(f, "unix:{}", path.display()),
            ListenAddr::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub auth_retries: u32,
    pub auth_retry_interval: Duration,
    pub poll_timeout: Duration,

    // HTTP
    pub listen: ListenAddr,
    pub base_url: String,

    // Storage
    pub db_path: PathBuf,
}

pub const DEFAULT_BASE_URL: &str = "http://localhost/notify";
pub const DEFAULT_SOCKET_PATH: &str = "socket.sock";
pub const DEFAULT_DB_PATH: &str = "server.db";

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let telegram_bot_token = get("API_KEY").ok_or_else(|| {
            Error::Config("API_KEY environment variable is required".to_string())
        })?;

        // Listener
        let family = get("ADDR_FAM").unwrap_or_else(|| "unix".to_string());
        let addr = get("ADDR").unwrap_or_else(|| DEFAULT_SOCKET_PATH.to_string());
        let listen = parse_listen_addr(&family, addr)?;

        let base_url = get("BASEURL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        // Startup authorization
        let auth_retries = parse_num::<u32>(get("AUTH_RETRIES")).unwrap_or(5).max(1);
        let auth_retry_interval =
            Duration::from_millis(parse_num::<u64>(get("AUTH_RETRY_INTERVAL_MS")).unwrap_or(5_000));

        // Long polling
        let poll_timeout =
            Duration::from_secs(parse_num::<u64>(get("POLL_TIMEOUT_SECS")).unwrap_or(60));

        let db_path = PathBuf::from(get("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()));

        Ok(Self {
            telegram_bot_token,
            auth_retries,
            auth_retry_interval,
            poll_timeout,
            listen,
            base_url,
            db_path,
        })
    }
}

fn parse_listen_addr(family: &str, addr: String) -> Result<ListenAddr> {
    match family.trim().to_lowercase().as_str() {
        "unix" => Ok(ListenAddr::Unix(PathBuf::from(addr))),
        "tcp" | "tcp4" | "tcp6" => Ok(ListenAddr::Tcp(addr)),
        other => Err(Error::Config(format!(
            "unsupported ADDR_FAM {other:?} (expected unix, tcp, tcp4 or tcp6)"
        ))),
    }
}

fn load_dotenv_if_present(path: &Path) {
    // Existing env always wins; dotenvy never overrides.
    match dotenvy::from_path(path) {
        Ok(()) => {}
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("ignoring {}: {e}", path.display()),
    }
}

fn parse_num<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
    v.and_then(|s| s.trim().parse::<T>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
