use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};

use crate::state::game::{GameState, SessionCode};

/// Scoreboard stored in the `scoreboards` collection, keyed by its session code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScoreboardDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub state: GameState,
}

impl MongoScoreboardDocument {
    pub fn new(code: SessionCode, state: GameState) -> Self {
        Self {
            id: code.to_string(),
            state,
        }
    }
}

pub fn doc_id(code: SessionCode) -> Document {
    doc! { "_id": code.to_string() }
}

/// Change-stream filter restricting notifications to one scoreboard, plus the
/// collection-level events that end every scoreboard at once.
pub fn watch_pipeline(code: SessionCode) -> Vec<Document> {
    vec![doc! {
        "$match": {
            "$or": [
                { "documentKey._id": code.to_string() },
                { "operationType": { "$in": ["drop", "invalidate"] } },
            ]
        }
    }]
}

#[cfg(test)]
mod tests {
    use mongodb::bson;

    use super::*;
    use crate::state::game::tests::sample_state;

    #[test]
    fn scoreboard_survives_bson_encoding() {
        let code = SessionCode::new(204_060).unwrap();
        let document = MongoScoreboardDocument::new(code, sample_state());

        let encoded = bson::serialize_to_document(&document).unwrap();
        assert_eq!(encoded.get_str("_id").unwrap(), "204060");

        let decoded: MongoScoreboardDocument = bson::deserialize_from_document(encoded).unwrap();
        assert_eq!(decoded.state, sample_state());
    }

    #[test]
    fn pipeline_matches_document_key_and_collection_events() {
        let code = SessionCode::new(204_060).unwrap();
        let pipeline = watch_pipeline(code);
        let stage = pipeline[0].get_document("$match").unwrap();
        let branches = stage.get_array("$or").unwrap();

        let by_key = branches[0].as_document().unwrap();
        assert_eq!(by_key.get_str("documentKey._id").unwrap(), "204060");

        let by_operation = branches[1].as_document().unwrap();
        let operations = by_operation
            .get_document("operationType")
            .unwrap()
            .get_array("$in")
            .unwrap();
        let operations: Vec<_> = operations.iter().filter_map(|op| op.as_str()).collect();
        assert_eq!(operations, ["drop", "invalidate"]);
    }
}
