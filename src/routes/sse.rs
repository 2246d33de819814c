use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    error::AppError,
    services::{session_service, sse_service},
    state::{SharedState, game::SessionCode},
};

#[utoipa::path(
    get,
    path = "/sessions/{code}/events",
    tag = "sse",
    params(("code" = String, Path, description = "Six digit session code")),
    responses(
        (status = 200, description = "Session event stream; the first frame is a snapshot", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Follow a session as a viewer.
pub async fn session_stream(
    State(state): State<SharedState>,
    Path(code): Path<SessionCode>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let handle = session_service::watch_for_client(&state, code).await?;
    info!(%code, "new session SSE connection");
    Ok(sse_service::to_sse_stream(handle))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{code}/events", get(session_stream))
}
