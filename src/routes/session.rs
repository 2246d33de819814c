use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{CreateSessionResponse, SessionConfig, SessionSnapshotResponse},
    error::AppError,
    services::session_service,
    state::{
        SharedState,
        game::{GameState, SessionCode},
        mutation::Mutation,
    },
};

const HOST_TOKEN_HEADER: &str = "x-host-token";

/// Session endpoints. Mutations and host release require the `X-Host-Token` header.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{code}", get(get_session))
        .route("/sessions/{code}/mutations", post(mutate_session))
        .route("/sessions/{code}/host", delete(release_host))
}

/// Create a scoreboard and start its host runtime.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = SessionConfig,
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Invalid configuration"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SessionConfig>>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let created = session_service::create_session_for_client(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Read a scoreboard once.
#[utoipa::path(
    get,
    path = "/sessions/{code}",
    tag = "sessions",
    params(("code" = String, Path, description = "Six digit session code")),
    responses(
        (status = 200, description = "Current document", body = SessionSnapshotResponse),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(code): Path<SessionCode>,
) -> Result<Json<SessionSnapshotResponse>, AppError> {
    Ok(Json(
        session_service::snapshot_for_client(&state, code).await?,
    ))
}

/// Apply one mutation through the host runtime.
#[utoipa::path(
    post,
    path = "/sessions/{code}/mutations",
    tag = "sessions",
    params(
        ("code" = String, Path, description = "Six digit session code"),
        ("X-Host-Token" = String, Header, description = "Token returned when the session was created")
    ),
    request_body = Mutation,
    responses(
        (status = 200, description = "Document after the mutation", body = GameState),
        (status = 400, description = "Rejected operation"),
        (status = 403, description = "Missing or wrong host token"),
        (status = 404, description = "No host runtime for this code"),
        (status = 410, description = "Session closed"),
        (status = 503, description = "Write failed; the host replica keeps the change")
    )
)]
pub async fn mutate_session(
    State(state): State<SharedState>,
    Path(code): Path<SessionCode>,
    headers: HeaderMap,
    Json(mutation): Json<Mutation>,
) -> Result<Json<GameState>, AppError> {
    let token = host_token(&headers)?;
    let document = session_service::mutate_for_client(&state, code, &token, mutation).await?;
    Ok(Json(document))
}

/// Stop the host runtime and release its subscription.
#[utoipa::path(
    delete,
    path = "/sessions/{code}/host",
    tag = "sessions",
    params(
        ("code" = String, Path, description = "Six digit session code"),
        ("X-Host-Token" = String, Header, description = "Token returned when the session was created")
    ),
    responses(
        (status = 204, description = "Host runtime stopped"),
        (status = 403, description = "Missing or wrong host token"),
        (status = 404, description = "No host runtime for this code")
    )
)]
pub async fn release_host(
    State(state): State<SharedState>,
    Path(code): Path<SessionCode>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = host_token(&headers)?;
    session_service::release_host_for_client(&state, code, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn host_token(headers: &HeaderMap) -> Result<Uuid, AppError> {
    headers
        .get(HOST_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| AppError::Forbidden("missing or malformed `X-Host-Token` header".into()))
}
