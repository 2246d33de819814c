use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of host sessions served by this process.
    pub host_sessions: usize,
}

impl HealthResponse {
    /// The store is reachable.
    pub fn ok(host_sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            host_sessions,
        }
    }

    /// No backend is connected or the connected one fails its health check.
    pub fn degraded(host_sessions: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            host_sessions,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
