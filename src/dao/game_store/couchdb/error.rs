use reqwest::StatusCode;
use thiserror::Error;

pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures of the CouchDB scoreboard store.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("invalid value `{value}` for `{var}`")]
    InvalidEnvVar { var: &'static str, value: String },
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The scoreboard database could not be read or created.
    #[error("cannot prepare scoreboard database `{database}`")]
    PrepareDatabase {
        database: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB answered {status} while preparing `{database}`")]
    DatabaseRejected {
        database: String,
        status: StatusCode,
    },
    /// Sending a request or reading its body failed.
    #[error("CouchDB request to `{endpoint}` failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB answered {status} for `{endpoint}`")]
    UnexpectedStatus {
        endpoint: String,
        status: StatusCode,
    },
    /// A stored or pushed document is not a scoreboard.
    #[error("document `{doc_id}` is not a valid scoreboard")]
    InvalidScoreboard {
        doc_id: String,
        #[source]
        source: serde_json::Error,
    },
    /// Revision conflicts kept winning after every retry.
    #[error("gave up overwriting `{doc_id}` after {attempts} revision conflicts")]
    PersistentConflict { doc_id: String, attempts: u32 },
}
