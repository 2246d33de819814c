use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Connect the storage backend and keep the shared state in degraded mode while it is unusable.
///
/// Runs forever: after the reconnect budget of a failing store is spent, a fresh connection
/// is attempted with exponential backoff.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn GameStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_game_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                supervise(&state, store.as_ref()).await;
                warn!("exhausted storage reconnect attempts; staying in degraded mode");
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
            }
        }

        sleep(delay).await;
        delay = next_delay(delay);
    }
}

/// Poll the store's health until it fails and cannot be revived.
async fn supervise(state: &SharedState, store: &dyn GameStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                if !reconnect(state, store).await {
                    return;
                }
                state.update_degraded(false);
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect(state: &SharedState, store: &dyn GameStore) -> bool {
    let mut delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(delay).await;
                delay = next_delay(delay);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::game_store::memory::MemoryGameStore, state::AppState};

    #[tokio::test(start_paused = true)]
    async fn degraded_mode_follows_store_health() {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemoryGameStore::new());
        assert!(state.is_degraded());

        let backend = store.clone();
        let supervisor = tokio::spawn(run(state.clone(), move || {
            let backend = backend.clone();
            async move { Ok(backend as Arc<dyn GameStore>) }
        }));

        sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded());

        store.set_online(false);
        sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(10)).await;
        assert!(state.is_degraded());
        assert!(state.require_game_store().await.is_err());

        store.set_online(true);
        sleep(INITIAL_DELAY + Duration::from_millis(10)).await;
        assert!(!state.is_degraded());

        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connections_keep_the_state_degraded() {
        let state = AppState::new(AppConfig::default());
        let supervisor = tokio::spawn(run(state.clone(), || async {
            Err::<Arc<dyn GameStore>, _>(StorageError::Offline("unreachable".into()))
        }));

        sleep(Duration::from_secs(30)).await;
        assert!(state.is_degraded());
        assert!(state.game_store().await.is_none());

        supervisor.abort();
    }
}
