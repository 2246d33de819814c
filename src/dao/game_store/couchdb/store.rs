use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use tracing::{debug, warn};

use crate::{
    dao::{
        game_store::{GameStore, SnapshotStream},
        storage::{StorageError, StorageResult},
    },
    state::game::{GameState, SessionCode},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        ChangesResponse, CouchScoreboardDocument, DatabaseInfo, RevisionOnly, scoreboard_doc_id,
        sequence_token,
    },
};

const CHANGES: &str = "_changes";
const MAX_CONFLICT_ATTEMPTS: u32 = 5;
const FEED_RETRY_INITIAL: Duration = Duration::from_millis(500);
const FEED_RETRY_MAX: Duration = Duration::from_secs(10);

enum PutOutcome {
    Stored,
    Conflict,
}

#[derive(Clone)]
pub struct CouchGameStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    changes_timeout: Duration,
}

impl CouchGameStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let auth = config
            .credentials
            .map(|(user, pass)| (Arc::<str>::from(user), Arc::<str>::from(pass)));

        let store = Self {
            client,
            base_url: Arc::from(config.base_url),
            database: Arc::from(config.database),
            auth,
            changes_timeout: config.changes_timeout,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorized(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::PrepareDatabase {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorized(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::PrepareDatabase {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseRejected {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseRejected {
                database,
                status: other,
            }),
        }
    }

    async fn database_info(&self) -> CouchResult<DatabaseInfo> {
        let url = self.database_url();
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                endpoint: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::UnexpectedStatus {
                endpoint: url,
                status: response.status(),
            });
        }

        response
            .json::<DatabaseInfo>()
            .await
            .map_err(|source| CouchDaoError::Transport { endpoint: url, source })
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                endpoint: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::Transport {
                        endpoint: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::UnexpectedStatus {
                endpoint: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<PutOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                endpoint: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status == StatusCode::CONFLICT => Ok(PutOutcome::Conflict),
            status if status.is_success() => Ok(PutOutcome::Stored),
            status => Err(CouchDaoError::UnexpectedStatus {
                endpoint: doc_id.to_string(),
                status,
            }),
        }
    }

    /// Overwrite the scoreboard whatever its current revision is.
    async fn overwrite(&self, code: SessionCode, state: GameState) -> CouchResult<()> {
        let doc_id = scoreboard_doc_id(code);
        let mut document = CouchScoreboardDocument::new(code, state, None);

        for attempt in 1..=MAX_CONFLICT_ATTEMPTS {
            document.rev = self
                .get_document::<RevisionOnly>(&doc_id)
                .await?
                .map(|existing| existing.rev);

            match self.put_document(&doc_id, &document).await? {
                PutOutcome::Stored => return Ok(()),
                PutOutcome::Conflict => {
                    debug!(%code, attempt, "revision conflict while writing scoreboard; retrying");
                }
            }
        }

        Err(CouchDaoError::PersistentConflict {
            doc_id,
            attempts: MAX_CONFLICT_ATTEMPTS,
        })
    }

    /// Store the scoreboard unless a revision already exists; CouchDB answers 409 then.
    async fn insert(&self, code: SessionCode, state: GameState) -> CouchResult<bool> {
        let document = CouchScoreboardDocument::new(code, state, None);
        match self.put_document(&scoreboard_doc_id(code), &document).await? {
            PutOutcome::Stored => Ok(true),
            PutOutcome::Conflict => Ok(false),
        }
    }

    async fn load(&self, code: SessionCode) -> CouchResult<Option<GameState>> {
        let doc = self
            .get_document::<CouchScoreboardDocument>(&scoreboard_doc_id(code))
            .await?;
        Ok(doc.map(|doc| doc.state))
    }

    /// One long-poll round against `_changes`, filtered to a single document.
    async fn poll_changes(&self, doc_id: &str, since: &str) -> CouchResult<ChangesResponse> {
        let doc_ids = format!("[\"{doc_id}\"]");
        let timeout = self.changes_timeout.as_millis().to_string();
        let query = [
            ("feed", "longpoll"),
            ("filter", "_doc_ids"),
            ("doc_ids", doc_ids.as_str()),
            ("include_docs", "true"),
            ("since", since),
            ("timeout", timeout.as_str()),
        ];

        let response = self
            .request(Method::GET, CHANGES)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                endpoint: CHANGES.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::UnexpectedStatus {
                endpoint: CHANGES.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::Transport {
                endpoint: CHANGES.to_string(),
                source,
            })
    }
}

fn snapshot_from_change(
    doc_id: &str,
    deleted: bool,
    doc: Option<serde_json::Value>,
) -> CouchResult<Option<GameState>> {
    match doc {
        Some(doc) if !deleted => from_value::<CouchScoreboardDocument>(doc)
            .map(|doc| Some(doc.state))
            .map_err(|source| CouchDaoError::InvalidScoreboard {
                doc_id: doc_id.to_string(),
                source,
            }),
        _ => Ok(None),
    }
}

impl GameStore for CouchGameStore {
    fn get(&self, code: SessionCode) -> BoxFuture<'static, StorageResult<Option<GameState>>> {
        let store = self.clone();
        Box::pin(async move { store.load(code).await.map_err(Into::into) })
    }

    fn set(&self, code: SessionCode, state: GameState) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.overwrite(code, state).await.map_err(Into::into) })
    }

    fn create(&self, code: SessionCode, state: GameState) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert(code, state).await.map_err(Into::into) })
    }

    fn subscribe(&self, code: SessionCode) -> BoxFuture<'static, StorageResult<SnapshotStream>> {
        let store = self.clone();
        Box::pin(async move {
            // Read the sequence before the document so no write can fall between the two.
            let info = store.database_info().await?;
            let current = store.load(code).await?;
            let mut since = sequence_token(&info.update_seq);
            let doc_id = scoreboard_doc_id(code);

            let stream = async_stream::stream! {
                yield Ok::<_, StorageError>(current);
                let mut backoff = FEED_RETRY_INITIAL;
                loop {
                    match store.poll_changes(&doc_id, &since).await {
                        Ok(changes) => {
                            backoff = FEED_RETRY_INITIAL;
                            since = sequence_token(&changes.last_seq);
                            for row in changes.results {
                                yield snapshot_from_change(&row.id, row.deleted, row.doc)
                                    .map_err(StorageError::from);
                            }
                        }
                        Err(err) => {
                            warn!(%code, error = %err, "CouchDB change feed failed; retrying");
                            yield Err(StorageError::from(err));
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(FEED_RETRY_MAX);
                        }
                    }
                }
                // Pins the generator body to `()` under edition-2024 never-type fallback.
                #[allow(unreachable_code)]
                ()
            };

            Ok(Box::pin(stream) as SnapshotStream)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .database_info()
                .await
                .map(|_| ())
                .map_err(Into::into)
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::game::tests::sample_state;

    #[test]
    fn deleted_rows_end_the_document() {
        let doc = json!({ "_id": "scoreboard::123456", "_deleted": true });
        let snapshot = snapshot_from_change("scoreboard::123456", true, Some(doc)).unwrap();
        assert!(snapshot.is_none());
    }

    #[test]
    fn live_rows_decode_into_game_state() {
        let code = SessionCode::new(123_456).unwrap();
        let doc = CouchScoreboardDocument::new(code, sample_state(), Some("3-abc".into()));
        let value = serde_json::to_value(doc).unwrap();

        let snapshot = snapshot_from_change("scoreboard::123456", false, Some(value)).unwrap();
        assert_eq!(snapshot, Some(sample_state()));
    }

    #[test]
    fn malformed_rows_are_reported() {
        let err = snapshot_from_change("scoreboard::1", false, Some(json!({ "_id": "x" })))
            .unwrap_err();
        assert!(matches!(err, CouchDaoError::InvalidScoreboard { .. }));
    }
}
