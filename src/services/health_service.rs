use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness together with a few load figures.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let active_games = state.sessions().len();
    let subscribers = state.sse().subscriber_count();
    debug!(active_games, subscribers, "health check");
    HealthResponse::ok(active_games, subscribers)
}
