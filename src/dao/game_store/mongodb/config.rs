use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "courtside";
const DEFAULT_COLLECTION: &str = "scoreboards";
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Connection settings for the MongoDB scoreboard store.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
    pub collection_name: String,
    /// Pings tried before a connection attempt is abandoned.
    pub connect_attempts: u32,
}

impl MongoConfig {
    /// Read `MONGO_URI` (required), `MONGO_DB`, `MONGO_COLLECTION` and
    /// `MONGO_CONNECT_ATTEMPTS`.
    pub async fn from_env() -> MongoResult<Self> {
        Self::from_lookup(|var| std::env::var(var).ok()).await
    }

    async fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MongoResult<Self> {
        let uri = lookup("MONGO_URI").ok_or(MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let connect_attempts = match lookup("MONGO_CONNECT_ATTEMPTS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or(MongoDaoError::InvalidEnvVar {
                    var: "MONGO_CONNECT_ATTEMPTS",
                    value: raw,
                })?,
            None => DEFAULT_CONNECT_ATTEMPTS,
        };

        let options = ClientOptions::parse(&uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri { uri, source })?;

        Ok(Self {
            options,
            database_name: lookup("MONGO_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_owned()),
            collection_name: lookup("MONGO_COLLECTION")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_owned()),
            connect_attempts,
        })
    }
}
