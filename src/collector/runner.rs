use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::task::JoinSet;
use tokio::time::{Duration, sleep};

use crate::{cache::PriceCache, exchanges::connector::ExchangeConnector, metrics::METRICS};

/// Delay between reconnect attempts.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Wraps a connect-and-stream routine in an unconditional retry loop.
///
/// On any error or clean stream end: log the cause, sleep
/// RESTART_DELAY, try again. There is no retry cap and no
/// exponential backoff; a connector must keep prices flowing for the
/// process lifetime, so it trades a little wasted effort during long
/// outages for never having to be restarted by hand.
///
/// GUARANTEES:
/// - This loop never exits
/// - A failed attempt leaves no state behind; the next attempt
///   starts from scratch
pub async fn supervise<F, Fut>(label: &str, mut connect: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    loop {
        match connect().await {
            Ok(()) => log::info!(
                "[{}] stream ended cleanly, reconnecting in {}s",
                label,
                RESTART_DELAY.as_secs()
            ),
            Err(e) => log::warn!(
                "[{}] {:#}, reconnecting in {}s",
                label,
                e,
                RESTART_DELAY.as_secs()
            ),
        }
        METRICS.ws_reconnects.fetch_add(1, Ordering::Relaxed);
        sleep(RESTART_DELAY).await;
    }
}

/// Dispatcher: spawns one supervised task per enabled connector.
///
/// The returned JoinSet holds every task handle; the caller awaits
/// them all. Connector loops never exit in normal operation, so
/// that wait is effectively permanent.
///
/// Kraken's per-batch sub-tasks are NOT held here; they live in the
/// Kraken connector's own task group, spawned after discovery.
pub fn spawn_exchanges(
    connectors: Vec<Arc<dyn ExchangeConnector>>,
    cache: Arc<PriceCache>,
) -> JoinSet<()> {
    let mut tasks = JoinSet::new();

    for connector in connectors {
        log::info!("starting {} connector", connector.name());
        METRICS.exchanges_active.fetch_add(1, Ordering::Relaxed);

        let cache = Arc::clone(&cache);
        tasks.spawn(async move {
            let label = connector.name();
            supervise(label, move || {
                let connector = Arc::clone(&connector);
                let cache = Arc::clone(&cache);
                async move { connector.connect_and_listen(cache).await }
            })
            .await;
        });
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    // Virtual time: a failed first attempt must be retried after
    // RESTART_DELAY, and the successful retry's writes must land.
    #[tokio::test(start_paused = true)]
    async fn failed_first_attempt_recovers_on_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(PriceCache::new());

        let task_attempts = Arc::clone(&attempts);
        let task_cache = Arc::clone(&cache);
        tokio::spawn(async move {
            supervise("test", move || {
                let n = task_attempts.fetch_add(1, Ordering::SeqCst);
                let cache = Arc::clone(&task_cache);
                async move {
                    if n == 0 {
                        anyhow::bail!("connection refused");
                    }
                    cache.update("test", "BTC_USDT", dec!(42));
                    // Stream forever, as a healthy connection would
                    std::future::pending::<()>().await;
                    Ok(())
                }
            })
            .await;
        });

        // Attempt 1 fails immediately; attempt 2 starts after the
        // 5s backoff and succeeds.
        tokio::time::sleep(RESTART_DELAY + Duration::from_secs(1)).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get_price("test", "BTC_USDT"), Some(dec!(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn clean_exit_is_also_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));

        let task_attempts = Arc::clone(&attempts);
        tokio::spawn(async move {
            supervise("test", move || {
                task_attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        });

        tokio::time::sleep(RESTART_DELAY * 3 + Duration::from_secs(1)).await;

        // One attempt per backoff window, forever
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
