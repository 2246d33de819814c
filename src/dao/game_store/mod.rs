#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::{future::BoxFuture, stream::BoxStream};

use crate::dao::storage::StorageResult;
use crate::state::game::{GameState, SessionCode};

/// Stream of full-document notifications for one session.
///
/// `Ok(None)` means the document no longer exists. The first item reflects the document as it
/// was when the subscription opened. Dropping the stream releases the subscription.
pub type SnapshotStream = BoxStream<'static, StorageResult<Option<GameState>>>;

/// Keyed document store with push-based change notification.
///
/// `set` overwrites the whole document; the last committed write wins. Subscribers see every
/// committed write at least once, their own writes included, with no ordering guarantee across
/// writers.
pub trait GameStore: Send + Sync {
    fn get(&self, code: SessionCode) -> BoxFuture<'static, StorageResult<Option<GameState>>>;
    fn set(&self, code: SessionCode, state: GameState) -> BoxFuture<'static, StorageResult<()>>;
    /// Write `state` only if no document exists for `code`. Resolves to `false` when the code
    /// is already taken.
    fn create(&self, code: SessionCode, state: GameState) -> BoxFuture<'static, StorageResult<bool>>;
    fn subscribe(&self, code: SessionCode) -> BoxFuture<'static, StorageResult<SnapshotStream>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
