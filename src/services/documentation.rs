use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Mafiadon Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::all_scopes_stream,
        crate::routes::sse::scope_stream,
        crate::routes::game::start_game,
        crate::routes::game::players,
        crate::routes::game::eliminate,
        crate::routes::game::reset_votes,
        crate::routes::game::reset_game,
        crate::routes::game::vote,
        crate::routes::game::unvote,
        crate::routes::game::tally,
        crate::routes::game::hammer,
        crate::routes::game::set_role,
        crate::routes::game::status,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::Notice,
            crate::dto::game::OutcomeDto,
            crate::dto::game::TallyEntryDto,
            crate::dto::game::CountdownSnapshot,
            crate::dto::game::GameStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "game", description = "Day-vote commands"),
    )
)]
pub struct ApiDoc;
