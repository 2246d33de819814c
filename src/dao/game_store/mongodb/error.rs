use mongodb::error::Error as MongoError;
use thiserror::Error;

use crate::state::game::SessionCode;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB scoreboard store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("invalid value `{value}` for `{var}`")]
    InvalidEnvVar { var: &'static str, value: String },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to save scoreboard `{code}`")]
    SaveScoreboard {
        code: SessionCode,
        #[source]
        source: MongoError,
    },
    #[error("failed to load scoreboard `{code}`")]
    LoadScoreboard {
        code: SessionCode,
        #[source]
        source: MongoError,
    },
    #[error("change stream for scoreboard `{code}` failed")]
    ChangeStream {
        code: SessionCode,
        #[source]
        source: MongoError,
    },
}
