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
    services::sse_service,
    state::{ScopeId, SharedState},
};

#[utoipa::path(
    get,
    path = "/sse",
    tag = "sse",
    responses((status = 200, description = "Notices of every scope", content_type = "text/event-stream", body = String))
)]
/// Stream the notices of every scope.
pub async fn all_scopes_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE connection");
    sse_service::to_sse_stream(sse_service::subscribe(&state, None))
}

#[utoipa::path(
    get,
    path = "/sse/scopes/{scope}",
    tag = "sse",
    params(("scope" = String, Path, description = "Scope whose notices are streamed")),
    responses((status = 200, description = "Notices of one scope", content_type = "text/event-stream", body = String))
)]
/// Stream the notices of one scope.
pub async fn scope_stream(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(%scope, "New scope SSE connection");
    sse_service::to_sse_stream(sse_service::subscribe(&state, Some(scope)))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse", get(all_scopes_stream))
        .route("/sse/scopes/{scope}", get(scope_stream))
}
