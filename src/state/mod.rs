pub mod clock;
pub mod game;
pub mod mutation;
pub mod reconcile;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::game_store::GameStore,
    error::ServiceError,
    services::session_runtime::{RuntimeOptions, SessionHandle},
    state::game::SessionCode,
};

pub type SharedState = Arc<AppState>;

/// Host runtime owned by the server on behalf of the client holding `token`.
struct HostSession {
    token: Uuid,
    handle: Arc<SessionHandle>,
}

/// Process-wide state shared by the HTTP layer: the store slot, degraded flag and the
/// registry of host runtimes.
pub struct AppState {
    config: AppConfig,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    hosts: DashMap<SessionCode, HostSession>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`].
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            hosts: DashMap::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runtime tuning derived from the loaded configuration.
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions::from(&self.config)
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// The installed store, or `Degraded` while none is usable.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn set_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// Keep a host runtime alive and return the token that authorizes its mutations.
    pub fn register_host(&self, handle: SessionHandle) -> Uuid {
        let token = Uuid::new_v4();
        let code = handle.code();
        self.hosts.insert(
            code,
            HostSession {
                token,
                handle: Arc::new(handle),
            },
        );
        info!(%code, "host session registered");
        token
    }

    /// Look up the host runtime for `code`, checking the caller's token.
    pub fn host_session(
        &self,
        code: SessionCode,
        token: &Uuid,
    ) -> Result<Arc<SessionHandle>, ServiceError> {
        let handle = {
            let entry = self
                .hosts
                .get(&code)
                .ok_or_else(|| ServiceError::NotFound(format!("no host session for {code}")))?;
            if entry.token != *token {
                return Err(ServiceError::AuthorityViolation(
                    "host token does not match".into(),
                ));
            }
            entry.handle.clone()
        };

        if handle.is_closed() {
            self.hosts.remove(&code);
            return Err(ServiceError::SessionClosed);
        }
        Ok(handle)
    }

    /// Remove the host runtime for `code` after checking the caller's token.
    pub fn release_host(
        &self,
        code: SessionCode,
        token: &Uuid,
    ) -> Result<Arc<SessionHandle>, ServiceError> {
        let (_, session) = self
            .hosts
            .remove_if(&code, |_, session| session.token == *token)
            .ok_or_else(|| {
                if self.hosts.contains_key(&code) {
                    ServiceError::AuthorityViolation("host token does not match".into())
                } else {
                    ServiceError::NotFound(format!("no host session for {code}"))
                }
            })?;
        info!(%code, "host session released");
        Ok(session.handle)
    }

    /// Number of host runtimes currently registered.
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}
