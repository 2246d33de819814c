use std::{sync::Arc, time::Duration};

use futures::{StreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    change_stream::{
        ChangeStream,
        event::{ChangeStreamEvent, OperationType, ResumeToken},
    },
    error::{ErrorKind, WriteFailure},
    options::FullDocumentType,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    config::MongoConfig,
    connection::{Connection, establish_connection},
    error::{MongoDaoError, MongoResult},
    models::{MongoScoreboardDocument, doc_id, watch_pipeline},
};
use crate::{
    dao::{
        game_store::{GameStore, SnapshotStream},
        storage::{StorageError, StorageResult},
    },
    state::game::{GameState, SessionCode},
};

const DUPLICATE_KEY_CODE: i32 = 11000;
const WATCH_RETRY_INITIAL: Duration = Duration::from_millis(500);
const WATCH_RETRY_MAX: Duration = Duration::from_secs(10);

type ScoreboardChanges = ChangeStream<ChangeStreamEvent<MongoScoreboardDocument>>;

/// MongoDB-backed [`GameStore`]. Subscriptions need a replica set for change streams.
#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let Connection { client, database } = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let Connection { client, database } = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn collection(&self) -> Collection<MongoScoreboardDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoScoreboardDocument>(&self.inner.config.collection_name)
    }

    async fn load(&self, code: SessionCode) -> MongoResult<Option<GameState>> {
        let document = self
            .collection()
            .await
            .find_one(doc_id(code))
            .await
            .map_err(|source| MongoDaoError::LoadScoreboard { code, source })?;
        Ok(document.map(|doc| doc.state))
    }

    async fn save(&self, code: SessionCode, state: GameState) -> MongoResult<()> {
        let document = MongoScoreboardDocument::new(code, state);
        self.collection()
            .await
            .replace_one(doc_id(code), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveScoreboard { code, source })?;
        Ok(())
    }

    async fn insert(&self, code: SessionCode, state: GameState) -> MongoResult<bool> {
        let document = MongoScoreboardDocument::new(code, state);
        match self.collection().await.insert_one(&document).await {
            Ok(_) => Ok(true),
            Err(source) if is_duplicate_key(&source) => Ok(false),
            Err(source) => Err(MongoDaoError::SaveScoreboard { code, source }),
        }
    }

    async fn open_changes(
        &self,
        code: SessionCode,
        resume: Option<ResumeToken>,
    ) -> MongoResult<ScoreboardChanges> {
        let collection = self.collection().await;
        let mut watch = collection
            .watch()
            .pipeline(watch_pipeline(code))
            .full_document(FullDocumentType::UpdateLookup);
        if let Some(token) = resume {
            watch = watch.start_after(token);
        }

        watch
            .await
            .map_err(|source| MongoDaoError::ChangeStream { code, source })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

/// Map one change event to the snapshot it stands for. `None` means the event says nothing
/// about the document's content.
fn snapshot_from_event(
    event: ChangeStreamEvent<MongoScoreboardDocument>,
) -> Option<Option<GameState>> {
    match event.operation_type {
        OperationType::Delete | OperationType::Drop | OperationType::Invalidate => Some(None),
        OperationType::Insert | OperationType::Update | OperationType::Replace => {
            event.full_document.map(|doc| Some(doc.state))
        }
        _ => None,
    }
}

impl GameStore for MongoGameStore {
    fn get(&self, code: SessionCode) -> BoxFuture<'static, StorageResult<Option<GameState>>> {
        let store = self.clone();
        Box::pin(async move { store.load(code).await.map_err(Into::into) })
    }

    fn set(&self, code: SessionCode, state: GameState) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save(code, state).await.map_err(Into::into) })
    }

    fn create(&self, code: SessionCode, state: GameState) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert(code, state).await.map_err(Into::into) })
    }

    fn subscribe(&self, code: SessionCode) -> BoxFuture<'static, StorageResult<SnapshotStream>> {
        let store = self.clone();
        Box::pin(async move {
            // Open the stream before reading so a write between the two is still delivered.
            let mut changes = store.open_changes(code, None).await?;
            let current = store.load(code).await?;

            let stream = async_stream::stream! {
                yield Ok::<_, StorageError>(current);
                let mut backoff = WATCH_RETRY_INITIAL;
                loop {
                    match changes.next().await {
                        Some(Ok(event)) => {
                            backoff = WATCH_RETRY_INITIAL;
                            if let Some(snapshot) = snapshot_from_event(event) {
                                let ended = snapshot.is_none();
                                yield Ok(snapshot);
                                if ended {
                                    debug!(%code, "scoreboard removed; closing change stream");
                                    break;
                                }
                            }
                        }
                        Some(Err(source)) => {
                            let err = MongoDaoError::ChangeStream { code, source };
                            warn!(%code, error = %err, "change stream failed; reopening");
                            yield Err(StorageError::from(err));
                            loop {
                                tokio::time::sleep(backoff).await;
                                backoff = (backoff * 2).min(WATCH_RETRY_MAX);
                                match store.open_changes(code, changes.resume_token()).await {
                                    Ok(reopened) => {
                                        changes = reopened;
                                        break;
                                    }
                                    Err(err) => yield Err(StorageError::from(err)),
                                }
                            }
                        }
                        None => break,
                    }
                }
            };

            Ok(Box::pin(stream) as SnapshotStream)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
