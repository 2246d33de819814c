//! Scoreboard server binary wiring configuration, storage supervision, REST and SSE layers.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use courtside_sync::{
    config::{AppConfig, StoreKind},
    dao::{
        game_store::{GameStore, memory::MemoryGameStore},
        storage::StorageError,
    },
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState, clock::ClockMode},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    if config.clock.mode == ClockMode::Deadline {
        warn!("deadline clock mode enabled; remaining time follows the replicated anchor");
    }
    let port = config.port;
    let store_kind = config.store.kind;
    let app_state = AppState::new(config);

    let memory = MemoryGameStore::new();
    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        connect_store(store_kind, memory.clone())
    }));

    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, store = ?store_kind, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Open the configured backend. The in-memory store is shared across reconnects.
async fn connect_store(
    kind: StoreKind,
    memory: MemoryGameStore,
) -> Result<Arc<dyn GameStore>, StorageError> {
    match kind {
        StoreKind::Memory => Ok(Arc::new(memory)),
        #[cfg(feature = "couch-store")]
        StoreKind::CouchDb => {
            use courtside_sync::dao::game_store::couchdb::{CouchConfig, CouchGameStore};

            let config = CouchConfig::from_env()?;
            Ok(Arc::new(CouchGameStore::connect(config).await?))
        }
        #[cfg(feature = "mongo-store")]
        StoreKind::MongoDb => {
            use courtside_sync::dao::game_store::mongodb::{MongoConfig, MongoGameStore};

            let config = MongoConfig::from_env().await?;
            Ok(Arc::new(MongoGameStore::connect(config).await?))
        }
        #[allow(unreachable_patterns)]
        other => Err(StorageError::Offline(format!(
            "{other:?} support is not compiled into this binary"
        ))),
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
