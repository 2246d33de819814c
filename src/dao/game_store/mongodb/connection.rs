use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

const FIRST_PING_DELAY: Duration = Duration::from_millis(250);
const MAX_PING_DELAY: Duration = Duration::from_secs(5);

/// Client and database handle that answered a ping.
pub struct Connection {
    pub client: Client,
    pub database: Database,
}

/// Build a fresh client for `config` and wait until the server is reachable.
pub async fn establish_connection(config: &MongoConfig) -> MongoResult<Connection> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    wait_until_reachable(&database, config.connect_attempts).await?;
    Ok(Connection { client, database })
}

async fn wait_until_reachable(database: &Database, max_attempts: u32) -> MongoResult<()> {
    let mut delay = FIRST_PING_DELAY;
    let mut attempt = 1;

    loop {
        let err = match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };
        if attempt >= max_attempts {
            return Err(MongoDaoError::InitialPing {
                attempts: attempt,
                source: err,
            });
        }

        debug!(attempt, database = database.name(), error = %err, "MongoDB not reachable yet");
        sleep(delay).await;
        delay = (delay * 2).min(MAX_PING_DELAY);
        attempt += 1;
    }
}
