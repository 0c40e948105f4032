use std::sync::Arc;

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tgn_core::{
    config::Config,
    listener::{CommandListener, NotifyLinks},
    messaging::port::MessagingPort,
    registry::Registry,
    store::TokenStore,
};
use tgn_http::NotifyState;
use tgn_sqlite::SqliteTokenStore;
use tgn_telegram::{auth::authorize, pump::UpdatePump, TelegramMessenger};

/// Updates buffered between the Telegram pump and the command listener.
const UPDATE_QUEUE: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tgn_core::logging::init("tgn")?;

    let res = run().await;
    if let Err(e) = &res {
        error!("fatal: {e:#}");
    }
    res
}

async fn run() -> anyhow::Result<()> {
    let cfg = Arc::new(Config::load().context("loading configuration")?);

    let store: Arc<dyn TokenStore> = Arc::new(
        SqliteTokenStore::open(&cfg.db_path)
            .with_context(|| format!("opening token store {}", cfg.db_path.display()))?,
    );
    let registry = Arc::new(Registry::new(store));

    let bot = tgn_telegram::build_bot(&cfg.telegram_bot_token, cfg.poll_timeout)?;
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    // Bind before the Telegram handshake; a bind failure is fatal.
    let bound = tgn_http::bind(&cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;
    let app = tgn_http::router(NotifyState {
        registry: registry.clone(),
        messenger: messenger.clone(),
    });
    let http = tokio::spawn(tgn_http::serve(bound, app, cancel.clone()));

    let authorized = tokio::select! {
        _ = cancel.cancelled() => None,
        res = authorize(&bot, cfg.auth_retries, cfg.auth_retry_interval) => Some(res),
    };
    let username = match authorized {
        Some(Ok(username)) => username,
        Some(Err(e)) => {
            cancel.cancel();
            let _ = http.await;
            return Err(e.into());
        }
        None => return join_http(http).await,
    };

    let (tx, rx) = mpsc::channel(UPDATE_QUEUE);
    let listener = CommandListener::new(
        registry,
        messenger,
        NotifyLinks::new(cfg.base_url.clone()),
    )
    .with_bot_username(username);
    let listener_task = tokio::spawn(listener.run(rx, cancel.clone()));
    let pump_task = tokio::spawn(UpdatePump::new(bot, cfg.poll_timeout).run(tx, cancel.clone()));

    // The HTTP server only returns on shutdown or a fatal accept error;
    // either way everything else goes down with it.
    let served = join_http(http).await;
    cancel.cancel();
    if let Err(e) = pump_task.await {
        warn!("update pump task failed: {e}");
    }
    if let Err(e) = listener_task.await {
        warn!("command listener task failed: {e}");
    }

    info!("shutdown complete");
    served
}

async fn join_http(http: tokio::task::JoinHandle<tgn_core::Result<()>>) -> anyhow::Result<()> {
    http.await.context("http server task failed")??;
    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    cancel.cancel();
}
