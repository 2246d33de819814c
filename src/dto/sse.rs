use serde::Serialize;

use crate::{services::session_runtime::SessionEvent, state::game::GameState};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Encode a runtime event under its own event name.
    pub fn from_session_event(event: &SessionEvent) -> serde_json::Result<Self> {
        Self::json(event.event_name().to_string(), event)
    }

    /// A full snapshot frame, used when a stream opens or falls behind.
    pub fn snapshot(state: &GameState) -> serde_json::Result<Self> {
        Self::from_session_event(&SessionEvent::Snapshot {
            state: state.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::tests::sample_state;

    #[test]
    fn snapshot_frames_carry_the_document() {
        let frame = ServerEvent::snapshot(&sample_state()).unwrap();
        assert_eq!(frame.event.as_deref(), Some("snapshot"));

        let body: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(body["type"], "snapshot");
        assert_eq!(body["state"]["teamA"]["name"], "Home");
    }

    #[test]
    fn ended_frames_have_no_payload_fields() {
        let frame = ServerEvent::from_session_event(&SessionEvent::SessionEnded).unwrap();
        assert_eq!(frame.event.as_deref(), Some("sessionEnded"));
        assert_eq!(frame.data, r#"{"type":"sessionEnded"}"#);
    }
}
