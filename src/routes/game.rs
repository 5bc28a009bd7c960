use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::game::{
        CallerRequest, EliminationSummary, HammerSummary, PlayersSummary, ResetGameSummary,
        ResetVotesSummary, SetRoleRequest, SetRoleSummary, StartGameResponse, StatusSummary,
        TallyResponse, TargetRequest, VoteSummary,
    },
    error::AppError,
    services::game_service,
    state::{ScopeId, SharedState},
};

/// Game command routes, one per chat command, keyed by scope.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/scopes/{scope}/startgame", post(start_game))
        .route("/scopes/{scope}/players", get(players))
        .route("/scopes/{scope}/eliminate", post(eliminate))
        .route("/scopes/{scope}/resetvotes", post(reset_votes))
        .route("/scopes/{scope}/resetgame", post(reset_game))
        .route("/scopes/{scope}/vote", post(vote))
        .route("/scopes/{scope}/unvote", post(unvote))
        .route("/scopes/{scope}/tally", get(tally))
        .route("/scopes/{scope}/hammer", post(hammer))
        .route("/scopes/{scope}/setrole", post(set_role))
        .route("/scopes/{scope}/status", get(status))
}

/// Start a game with every holder of the player role (moderators only).
#[utoipa::path(
    post,
    path = "/scopes/{scope}/startgame",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    request_body = CallerRequest,
    responses(
        (status = 200, description = "Game started", body = StartGameResponse),
        (status = 403, description = "Caller is not a moderator"),
        (status = 409, description = "A game is running, or the role is missing or too small")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
    Valid(Json(payload)): Valid<Json<CallerRequest>>,
) -> Result<Json<StartGameResponse>, AppError> {
    let response = game_service::start_game(&state, scope, payload.caller).await?;
    Ok(Json(response))
}

/// List active and eliminated players.
#[utoipa::path(
    get,
    path = "/scopes/{scope}/players",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    responses(
        (status = 200, description = "Players of the scope", body = PlayersSummary)
    )
)]
pub async fn players(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
) -> Result<Json<PlayersSummary>, AppError> {
    let summary = game_service::players(&state, scope).await?;
    Ok(Json(summary))
}

/// Eliminate a player (moderators only).
#[utoipa::path(
    post,
    path = "/scopes/{scope}/eliminate",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    request_body = TargetRequest,
    responses(
        (status = 200, description = "Player eliminated", body = EliminationSummary),
        (status = 403, description = "Caller is not a moderator"),
        (status = 404, description = "Target is not in the game")
    )
)]
pub async fn eliminate(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
    Valid(Json(payload)): Valid<Json<TargetRequest>>,
) -> Result<Json<EliminationSummary>, AppError> {
    let summary = game_service::eliminate(&state, scope, payload.caller, payload.target).await?;
    Ok(Json(summary))
}

/// Clear every vote and cancel the countdown (moderators only).
#[utoipa::path(
    post,
    path = "/scopes/{scope}/resetvotes",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    request_body = CallerRequest,
    responses(
        (status = 200, description = "Votes cleared", body = ResetVotesSummary),
        (status = 403, description = "Caller is not a moderator")
    )
)]
pub async fn reset_votes(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
    Valid(Json(payload)): Valid<Json<CallerRequest>>,
) -> Result<Json<ResetVotesSummary>, AppError> {
    let summary = game_service::reset_votes(&state, scope, payload.caller).await?;
    Ok(Json(summary))
}

/// Discard the game (moderators only).
#[utoipa::path(
    post,
    path = "/scopes/{scope}/resetgame",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    request_body = CallerRequest,
    responses(
        (status = 200, description = "Game discarded", body = ResetGameSummary),
        (status = 403, description = "Caller is not a moderator")
    )
)]
pub async fn reset_game(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
    Valid(Json(payload)): Valid<Json<CallerRequest>>,
) -> Result<Json<ResetGameSummary>, AppError> {
    let summary = game_service::reset_game(&state, scope, payload.caller).await?;
    Ok(Json(summary))
}

/// Vote for a player, replacing any previous vote.
#[utoipa::path(
    post,
    path = "/scopes/{scope}/vote",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    request_body = TargetRequest,
    responses(
        (status = 200, description = "Vote recorded", body = VoteSummary),
        (status = 400, description = "Ineligible voter or target, or self vote"),
        (status = 503, description = "Countdown timers could not be armed")
    )
)]
pub async fn vote(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
    Valid(Json(payload)): Valid<Json<TargetRequest>>,
) -> Result<Json<VoteSummary>, AppError> {
    let summary = game_service::cast_vote(&state, scope, payload.caller, payload.target).await?;
    Ok(Json(summary))
}

/// Withdraw the caller's vote.
#[utoipa::path(
    post,
    path = "/scopes/{scope}/unvote",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    request_body = CallerRequest,
    responses(
        (status = 200, description = "Vote withdrawn", body = VoteSummary),
        (status = 400, description = "Caller has no vote")
    )
)]
pub async fn unvote(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
    Valid(Json(payload)): Valid<Json<CallerRequest>>,
) -> Result<Json<VoteSummary>, AppError> {
    let summary = game_service::unvote(&state, scope, payload.caller).await?;
    Ok(Json(summary))
}

/// Current tally and countdown.
#[utoipa::path(
    get,
    path = "/scopes/{scope}/tally",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    responses(
        (status = 200, description = "Current tally", body = TallyResponse),
        (status = 409, description = "No game in progress")
    )
)]
pub async fn tally(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
) -> Result<Json<TallyResponse>, AppError> {
    let response = game_service::tally(&state, scope).await?;
    Ok(Json(response))
}

/// Start the countdown by hand.
#[utoipa::path(
    post,
    path = "/scopes/{scope}/hammer",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    request_body = CallerRequest,
    responses(
        (status = 200, description = "Countdown started", body = HammerSummary),
        (status = 409, description = "A countdown is already running"),
        (status = 503, description = "Countdown timers could not be armed")
    )
)]
pub async fn hammer(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
    Valid(Json(payload)): Valid<Json<CallerRequest>>,
) -> Result<Json<HammerSummary>, AppError> {
    let summary = game_service::hammer(&state, scope, payload.caller).await?;
    Ok(Json(summary))
}

/// Change the player role used by the next game (moderators only).
#[utoipa::path(
    post,
    path = "/scopes/{scope}/setrole",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "Player role updated", body = SetRoleSummary),
        (status = 403, description = "Caller is not a moderator")
    )
)]
pub async fn set_role(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
    Valid(Json(payload)): Valid<Json<SetRoleRequest>>,
) -> Result<Json<SetRoleSummary>, AppError> {
    let summary = game_service::set_role(&state, scope, payload.caller, &payload.role_name).await?;
    Ok(Json(summary))
}

/// Role, restriction and game status of the scope.
#[utoipa::path(
    get,
    path = "/scopes/{scope}/status",
    tag = "game",
    params(("scope" = String, Path, description = "Channel or guild the game runs in")),
    responses(
        (status = 200, description = "Scope status", body = StatusSummary)
    )
)]
pub async fn status(
    State(state): State<SharedState>,
    Path(scope): Path<ScopeId>,
) -> Result<Json<StatusSummary>, AppError> {
    let summary = game_service::status(&state, scope).await?;
    Ok(Json(summary))
}
