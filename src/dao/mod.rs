/// Remote store adapters for scoreboard documents.
pub mod game_store;
/// Storage abstraction layer for database operations.
pub mod storage;
