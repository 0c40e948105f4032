use std::{fmt::Display, future::Future, time::Duration};

use teloxide::prelude::*;
use tokio::time::sleep;
use tracing::{info, warn};

use tgn_core::{errors::Error, Result};

/// Authenticate with Telegram (`getMe`), retrying a fixed number of times.
///
/// Returns the bot's username. Exhausting `attempts` is fatal for the caller:
/// without the messaging channel the service has nothing to do.
pub async fn authorize(bot: &Bot, attempts: u32, interval: Duration) -> Result<String> {
    let me = retry_fixed(attempts, interval, || bot.get_me().send())
        .await
        .map_err(|e| {
            Error::External(format!(
                "could not authorise with telegram after {attempts} attempts: {e}"
            ))
        })?;

    let username = me.username().to_string();
    info!("authorized on account @{username}");
    Ok(username)
}

/// Run `op` up to `attempts` times, sleeping `interval` after each failure.
pub async fn retry_fixed<T, E, F, Fut>(
    attempts: u32,
    interval: Duration,
    mut op: F,
) -> std::result::Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                warn!("attempt {attempt}/{attempts} failed: {e}; retrying in {interval:?}");
                attempt += 1;
                sleep(interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let res: std::result::Result<(), String> =
            retry_fixed(3, Duration::from_millis(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("unauthorized".to_string()) }
            })
            .await;

        assert_eq!(res.unwrap_err(), "unauthorized");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let res: std::result::Result<u32, String> =
            retry_fixed(5, Duration::from_millis(1), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 2 {
                        Err("timeout".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(res.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let res: std::result::Result<(), String> = retry_fixed(0, Duration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope".to_string()) }
        })
        .await;

        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
