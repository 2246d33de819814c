use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the scoreboard server.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::session::get_session,
        crate::routes::session::mutate_session,
        crate::routes::session::release_host,
        crate::routes::sse::session_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::SessionConfig,
            crate::dto::session::TeamConfig,
            crate::dto::session::PlayerInput,
            crate::dto::session::CreateSessionResponse,
            crate::dto::session::SessionSnapshotResponse,
            crate::services::session_runtime::SessionEvent,
            crate::state::game::GameState,
            crate::state::mutation::Mutation,
            crate::state::mutation::StatKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Create, read and drive scoreboards"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sessions",
            "/sessions/{code}",
            "/sessions/{code}/mutations",
            "/sessions/{code}/host",
            "/sessions/{code}/events",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
