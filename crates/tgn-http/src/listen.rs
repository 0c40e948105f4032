//! Listener setup and serving.

use std::{io, path::PathBuf};

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tgn_core::{config::ListenAddr, errors::Error, Result};

/// A bound socket ready for `serve`.
pub enum BoundListener {
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
    Tcp(TcpListener),
}

impl BoundListener {
    pub fn describe(&self) -> String {
        match self {
            #[cfg(unix)]
            BoundListener::Unix { path, .. } => format!("unix:{}", path.display()),
            BoundListener::Tcp(l) => match l.local_addr() {
                Ok(addr) => format!("tcp:{addr}"),
                Err(_) => "tcp:?".to_string(),
            },
        }
    }
}

/// Bind `addr`. For unix sockets a stale socket file is removed first and the
/// new socket is made world-connectable so a fronting proxy can reach it.
pub async fn bind(addr: &ListenAddr) -> Result<BoundListener> {
    match addr {
        ListenAddr::Tcp(addr) => {
            let listener = TcpListener::bind(addr.as_str())
                .await
                .map_err(|e| with_context(e, format!("bind {addr}")))?;
            Ok(BoundListener::Tcp(listener))
        }
        #[cfg(unix)]
        ListenAddr::Unix(path) => bind_unix(path.clone()),
        #[cfg(not(unix))]
        ListenAddr::Unix(_) => Err(Error::Config(
            "unix sockets are not supported on this platform".to_string(),
        )),
    }
}

#[cfg(unix)]
fn bind_unix(path: PathBuf) -> Result<BoundListener> {
    use std::{fs, os::unix::fs::PermissionsExt};

    remove_socket_file(&path);

    let listener = tokio::net::UnixListener::bind(&path)
        .map_err(|e| with_context(e, format!("bind {}", path.display())))?;

    fs::set_permissions(&path, fs::Permissions::from_mode(0o777))
        .map_err(|e| with_context(e, format!("could not set mode of {}", path.display())))?;

    Ok(BoundListener::Unix { listener, path })
}

#[cfg(unix)]
fn remove_socket_file(path: &std::path::Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!("removed socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("no stale socket at {}", path.display())
        }
        Err(e) => warn!("error removing socket {}: {e}", path.display()),
    }
}

fn with_context(e: io::Error, what: String) -> Error {
    Error::Io(io::Error::new(e.kind(), format!("{what}: {e}")))
}

/// Serve `router` until `cancel` fires, then drain in-flight requests.
pub async fn serve(listener: BoundListener, router: Router, cancel: CancellationToken) -> Result<()> {
    info!("serving notify endpoint on {}", listener.describe());
    let shutdown = cancel.cancelled_owned();

    match listener {
        #[cfg(unix)]
        BoundListener::Unix { listener, path } => {
            let res = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await;
            remove_socket_file(&path);
            res?;
        }
        BoundListener::Tcp(listener) => {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await?;
        }
    }

    info!("notify endpoint shut down");
    Ok(())
}
