use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded mode and host count, pinging the store when one is installed.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let hosts = state.host_count();
    let store = match state.require_game_store().await {
        Ok(store) => store,
        Err(_) => {
            warn!("storage unavailable (degraded mode)");
            return HealthResponse::degraded(hosts);
        }
    };

    match store.health_check().await {
        Ok(()) => HealthResponse::ok(hosts),
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            HealthResponse::degraded(hosts)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::game_store::memory::MemoryGameStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, "degraded");

        state.set_game_store(Arc::new(MemoryGameStore::new())).await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.host_sessions, 0);
    }

    #[tokio::test]
    async fn failing_store_reports_degraded() {
        let state = AppState::new(AppConfig::default());
        let store = MemoryGameStore::new();
        state.set_game_store(Arc::new(store.clone())).await;

        store.set_online(false);
        assert!(!health_status(&state).await.is_ok());
    }
}
