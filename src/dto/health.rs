use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status, always "ok" while the server answers.
    pub status: String,
    /// Scopes with a game in progress.
    pub active_games: usize,
    /// Connected SSE clients.
    pub sse_subscribers: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(active_games: usize, sse_subscribers: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_games,
            sse_subscribers,
        }
    }
}
