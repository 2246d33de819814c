use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::game::{GameState, SessionCode};

pub const SCOREBOARD_PREFIX: &str = "scoreboard::";

/// Scoreboard stored as a CouchDB document. The body is exactly the replicated [`GameState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchScoreboardDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub state: GameState,
}

impl CouchScoreboardDocument {
    pub fn new(code: SessionCode, state: GameState, rev: Option<String>) -> Self {
        Self {
            id: scoreboard_doc_id(code),
            rev,
            state,
        }
    }
}

/// Just the revision of a document, used before overwriting it.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

/// Subset of `GET /{db}` used to start a change feed at the current sequence.
#[derive(Debug, Deserialize)]
pub struct DatabaseInfo {
    pub update_seq: Value,
}

/// Body of a `_changes` long-poll response.
#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    pub results: Vec<ChangeRow>,
    pub last_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<Value>,
}

pub fn scoreboard_doc_id(code: SessionCode) -> String {
    format!("{SCOREBOARD_PREFIX}{code}")
}

/// Sequence values are opaque strings on CouchDB 2+ and integers on 1.x.
pub fn sequence_token(value: &Value) -> String {
    match value {
        Value::String(token) => token.clone(),
        other => other.to_string(),
    }
}
