//! In-process store used by tests and single-node deployments.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{future::BoxFuture, stream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::{
    dao::{
        game_store::{GameStore, SnapshotStream},
        storage::{StorageError, StorageResult},
    },
    state::game::{GameState, SessionCode},
};

const CHANNEL_CAPACITY: usize = 32;

/// A stored document and the channel its subscribers listen on. Slots exist only while
/// their document does.
struct Slot {
    document: GameState,
    sender: broadcast::Sender<Option<GameState>>,
}

impl Slot {
    fn new(document: GameState) -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { document, sender }
    }
}

/// Documents kept in a [`DashMap`], fanned out to subscribers over broadcast channels.
#[derive(Clone)]
pub struct MemoryGameStore {
    slots: Arc<DashMap<SessionCode, Slot>>,
    online: Arc<AtomicBool>,
}

impl Default for MemoryGameStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate losing or regaining the connection. Reads and writes fail while offline;
    /// open subscriptions stay open.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Delete a document and notify its subscribers, whose streams then end.
    pub fn remove(&self, code: SessionCode) {
        if let Some((_, slot)) = self.slots.remove(&code) {
            let _ = slot.sender.send(None);
        }
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Offline("in-memory store is offline".into()))
        }
    }

    fn latest(&self, code: SessionCode) -> Option<GameState> {
        self.slots.get(&code).map(|slot| slot.document.clone())
    }
}

impl GameStore for MemoryGameStore {
    fn get(&self, code: SessionCode) -> BoxFuture<'static, StorageResult<Option<GameState>>> {
        let result = self.ensure_online().map(|()| self.latest(code));
        Box::pin(async move { result })
    }

    fn set(&self, code: SessionCode, state: GameState) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.ensure_online().map(|()| match self.slots.entry(code) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                slot.document = state.clone();
                let _ = slot.sender.send(Some(state));
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::new(state));
            }
        });
        Box::pin(async move { result })
    }

    fn create(&self, code: SessionCode, state: GameState) -> BoxFuture<'static, StorageResult<bool>> {
        let result = self.ensure_online().map(|()| match self.slots.entry(code) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Slot::new(state));
                true
            }
        });
        Box::pin(async move { result })
    }

    fn subscribe(&self, code: SessionCode) -> BoxFuture<'static, StorageResult<SnapshotStream>> {
        if let Err(err) = self.ensure_online() {
            return Box::pin(async move { Err(err) });
        }

        let Some((current, mut receiver)) = self
            .slots
            .get(&code)
            .map(|slot| (slot.document.clone(), slot.sender.subscribe()))
        else {
            let missing = stream::once(async { Ok::<Option<GameState>, StorageError>(None) });
            return Box::pin(async move { Ok(Box::pin(missing) as SnapshotStream) });
        };
        let store = self.clone();

        let stream = async_stream::stream! {
            yield Ok::<_, StorageError>(Some(current));
            loop {
                match receiver.recv().await {
                    Ok(document) => yield Ok(document),
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed notifications collapse into the latest document.
                        debug!(%code, skipped, "subscriber lagged; resending latest document");
                        yield Ok(store.latest(code));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };

        Box::pin(async move { Ok(Box::pin(stream) as SnapshotStream) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.ensure_online();
        Box::pin(async move { result })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::state::game::tests::sample_state;

    fn code() -> SessionCode {
        SessionCode::new(424_242).unwrap()
    }

    #[tokio::test]
    async fn get_returns_the_last_write() {
        let store = MemoryGameStore::new();
        assert!(store.get(code()).await.unwrap().is_none());

        let mut first = sample_state();
        first.team_a.score = 2;
        let mut second = sample_state();
        second.team_b.score = 3;

        store.set(code(), first).await.unwrap();
        store.set(code(), second.clone()).await.unwrap();
        assert_eq!(store.get(code()).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn subscribers_see_current_document_then_every_write() {
        let store = MemoryGameStore::new();
        store.set(code(), sample_state()).await.unwrap();

        let mut stream = store.subscribe(code()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Some(sample_state()));

        let mut updated = sample_state();
        updated.team_a.score = 9;
        store.set(code(), updated.clone()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Some(updated));

        store.remove(code());
        assert_eq!(stream.next().await.unwrap().unwrap(), None);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn subscribing_to_missing_codes_leaves_nothing_behind() {
        let store = MemoryGameStore::new();

        for raw in 100_000..101_000 {
            let code = SessionCode::new(raw).unwrap();
            let mut stream = store.subscribe(code).await.unwrap();
            assert_eq!(stream.next().await.unwrap().unwrap(), None);
            assert!(stream.next().await.is_none());
        }

        assert_eq!(store.slots.len(), 0);
    }

    #[tokio::test]
    async fn removed_documents_release_their_slot() {
        let store = MemoryGameStore::new();
        store.set(code(), sample_state()).await.unwrap();
        store.remove(code());
        assert_eq!(store.slots.len(), 0);
        assert!(store.get(code()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_never_overwrites_an_existing_document() {
        let store = MemoryGameStore::new();
        assert!(store.create(code(), sample_state()).await.unwrap());

        let mut other = sample_state();
        other.team_a.score = 50;
        assert!(!store.create(code(), other).await.unwrap());
        assert_eq!(store.get(code()).await.unwrap(), Some(sample_state()));
    }

    #[tokio::test]
    async fn offline_store_rejects_reads_and_writes() {
        let store = MemoryGameStore::new();
        store.set_online(false);
        assert!(store.set(code(), sample_state()).await.is_err());
        assert!(store.get(code()).await.is_err());
        assert!(store.create(code(), sample_state()).await.is_err());
        assert!(store.health_check().await.is_err());

        store.set_online(true);
        assert!(store.set(code(), sample_state()).await.is_ok());
    }
}
