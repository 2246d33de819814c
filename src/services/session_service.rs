//! Session lifecycle: create, join, subscribe and mutate.
//!
//! The free functions work against any [`GameStore`]; the `*_for_client` helpers add the
//! host registry and degraded-mode checks the HTTP layer needs.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::game_store::GameStore,
    dto::session::{CreateSessionResponse, SessionConfig, SessionSnapshotResponse},
    error::ServiceError,
    services::session_runtime::{RuntimeOptions, SessionHandle},
    state::{
        SharedState,
        clock::wall_clock_ms,
        game::{GameState, Role, SessionCode},
        mutation::Mutation,
    },
};

const MAX_CODE_ATTEMPTS: u32 = 8;

/// Validate `config`, build the initial document and persist it under a fresh code.
pub async fn create_session(
    store: &Arc<dyn GameStore>,
    config: SessionConfig,
) -> Result<(SessionCode, GameState), ServiceError> {
    config.validate()?;
    let state = config.into_initial_state(wall_clock_ms());

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = SessionCode::random();
        if !store.create(code, state.clone()).await? {
            debug!(%code, attempt, "session code already taken");
            continue;
        }

        info!(%code, game = %state.settings.game_name, "session created");
        return Ok((code, state));
    }

    Err(ServiceError::NoFreeCode {
        attempts: MAX_CODE_ATTEMPTS,
    })
}

/// One-shot read of a session's document.
pub async fn join_session(
    store: &Arc<dyn GameStore>,
    code: SessionCode,
) -> Result<GameState, ServiceError> {
    store
        .get(code)
        .await?
        .ok_or_else(|| ServiceError::NotFound(code.to_string()))
}

/// Open a synchronized view of `code`. Dropping or unsubscribing the handle releases it.
pub async fn subscribe(
    store: Arc<dyn GameStore>,
    code: SessionCode,
    role: Role,
    options: RuntimeOptions,
) -> Result<SessionHandle, ServiceError> {
    SessionHandle::open(store, code, role, options).await
}

/// Dispatch one operation through a host handle.
pub async fn mutate(handle: &SessionHandle, mutation: Mutation) -> Result<GameState, ServiceError> {
    handle.mutate(mutation).await
}

/// Create a session and keep its host runtime alive on the server.
pub async fn create_session_for_client(
    state: &SharedState,
    config: SessionConfig,
) -> Result<CreateSessionResponse, ServiceError> {
    let store = state.require_game_store().await?;
    let (code, document) = create_session(&store, config).await?;
    let handle = subscribe(store, code, Role::Host, state.runtime_options()).await?;
    let host_token = state.register_host(handle);

    Ok(CreateSessionResponse {
        code,
        host_token,
        state: document,
    })
}

/// Read the current document of `code`.
pub async fn snapshot_for_client(
    state: &SharedState,
    code: SessionCode,
) -> Result<SessionSnapshotResponse, ServiceError> {
    let store = state.require_game_store().await?;
    let document = join_session(&store, code).await?;
    Ok(SessionSnapshotResponse {
        code,
        state: document,
    })
}

/// Apply `mutation` through the host runtime registered for `code`.
pub async fn mutate_for_client(
    state: &SharedState,
    code: SessionCode,
    host_token: &Uuid,
    mutation: Mutation,
) -> Result<GameState, ServiceError> {
    if state.is_degraded() {
        return Err(ServiceError::Degraded);
    }
    let handle = state.host_session(code, host_token)?;
    mutate(&handle, mutation).await
}

/// Tear down the host runtime registered for `code`.
pub async fn release_host_for_client(
    state: &SharedState,
    code: SessionCode,
    host_token: &Uuid,
) -> Result<(), ServiceError> {
    let handle = state.release_host(code, host_token)?;
    // A concurrent mutation may still hold a clone; the runtime stops when it is dropped.
    if let Ok(handle) = Arc::try_unwrap(handle) {
        handle.unsubscribe().await;
    }
    Ok(())
}

/// Open a viewer runtime for streaming `code` to a client.
pub async fn watch_for_client(
    state: &SharedState,
    code: SessionCode,
) -> Result<SessionHandle, ServiceError> {
    let store = state.require_game_store().await?;
    subscribe(store, code, Role::Viewer, state.runtime_options()).await
}
