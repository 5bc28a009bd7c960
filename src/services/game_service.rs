use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::{sync::RwLock, time::Instant};
use tracing::{info, warn};

use crate::{
    dto::{
        format_system_time,
        game::{
            CountdownSnapshot, EliminationSummary, GameStatus, HammerSummary, PlayersSummary,
            ResetGameSummary, ResetVotesSummary, SetRoleSummary, StartGameResponse,
            StatusSummary, TallyResponse, TallySummary, VoteSummary,
        },
        sse::Notice,
    },
    error::ServiceError,
    services::countdown_service,
    state::{
        ScopeId, SessionHandle, SharedState, countdown::Arm, players::PlayerId,
        session::GameSession,
    },
};

/// Start a game in `scope` with every holder of the player role.
pub async fn start_game(
    state: &SharedState,
    scope: ScopeId,
    caller: PlayerId,
) -> Result<StartGameResponse, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    require_moderator(state, caller, &scope).await?;

    let role_name = state.player_role().await;
    let Some(holders) = state
        .membership()
        .list_role_holders(&scope, &role_name)
        .await
    else {
        return Err(ServiceError::InvalidState(format!(
            "role `{role_name}` does not exist in this scope"
        )));
    };

    let min_players = state.config().min_players();
    if holders.len() < min_players {
        return Err(ServiceError::InvalidState(format!(
            "at least {min_players} players holding `{role_name}` are needed (found {})",
            holders.len()
        )));
    }

    let response = match state.sessions().entry(scope.clone()) {
        Entry::Occupied(_) => {
            return Err(ServiceError::InvalidState(
                "a game is already in progress; reset it first".into(),
            ));
        }
        Entry::Vacant(slot) => {
            let mut session = GameSession::new(scope.clone(), state.config().countdown());
            session.initialize_players(holders)?;
            let players: Vec<PlayerId> = session.players().active_ids().into_iter().collect();
            let response = StartGameResponse {
                scope: scope.clone(),
                session_id: session.id(),
                created_at: format_system_time(session.created_at()),
                role_name,
                threshold: session.tally().threshold(),
                players,
            };
            slot.insert(Arc::new(RwLock::new(session)));
            response
        }
    };

    info!(%scope, %caller, players = response.players.len(), "game started");
    state.notifier().broadcast(
        &scope,
        Notice::GameStarted {
            players: response.players.clone(),
            threshold: response.threshold,
        },
    );
    Ok(response)
}

/// List the players of `scope`, or the prospective ones when no game runs.
pub async fn players(state: &SharedState, scope: ScopeId) -> Result<PlayersSummary, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    let role_name = state.player_role().await;

    if let Some(handle) = state.session(&scope) {
        let session = handle.read().await;
        let registry = session.players();
        return Ok(PlayersSummary {
            scope,
            game_running: true,
            role_name,
            role_found: true,
            active: registry.active_ids().into_iter().collect(),
            eliminated: registry.eliminated_ids().into_iter().collect(),
            threshold: Some(session.tally().threshold()),
        });
    }

    let prospective = state
        .membership()
        .list_role_holders(&scope, &role_name)
        .await;
    Ok(PlayersSummary {
        scope,
        game_running: false,
        role_name,
        role_found: prospective.is_some(),
        active: prospective.unwrap_or_default().into_iter().collect(),
        eliminated: Vec::new(),
        threshold: None,
    })
}

/// Eliminate `target` by moderator decision.
pub async fn eliminate(
    state: &SharedState,
    scope: ScopeId,
    caller: PlayerId,
    target: PlayerId,
) -> Result<EliminationSummary, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    require_moderator(state, caller, &scope).await?;
    let handle = require_session(state, &scope)?;

    let mut session = handle.write().await;
    let tally = TallySummary::from(&session.eliminate(target)?);
    info!(%scope, %caller, %target, "player eliminated");
    state.notifier().broadcast(
        &scope,
        Notice::PlayerEliminated {
            target,
            tally: tally.clone(),
        },
    );

    Ok(EliminationSummary {
        target,
        eliminated: session.players().eliminated_ids().into_iter().collect(),
        tally,
    })
}

/// Clear every vote and cancel the countdown; eliminations stand.
pub async fn reset_votes(
    state: &SharedState,
    scope: ScopeId,
    caller: PlayerId,
) -> Result<ResetVotesSummary, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    require_moderator(state, caller, &scope).await?;
    let handle = require_session(state, &scope)?;

    let mut session = handle.write().await;
    let cancelled = session.reset_votes();
    if let Some(generation) = cancelled {
        countdown_service::disarm(state, &session, generation);
    }

    let tally = session.tally();
    info!(%scope, %caller, cancelled = cancelled.is_some(), "votes reset");
    state.notifier().broadcast(
        &scope,
        Notice::VotesReset {
            cancelled_generation: cancelled,
            active_players: tally.active_players(),
            threshold: tally.threshold(),
        },
    );

    Ok(ResetVotesSummary {
        cancelled_countdown: cancelled.is_some(),
        active_players: session.players().active_ids().into_iter().collect(),
        threshold: tally.threshold(),
    })
}

/// Discard the game of `scope`, if any.
pub async fn reset_game(
    state: &SharedState,
    scope: ScopeId,
    caller: PlayerId,
) -> Result<ResetGameSummary, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    require_moderator(state, caller, &scope).await?;

    let Some((_, handle)) = state.sessions().remove(&scope) else {
        info!(%scope, %caller, "reset requested without a game");
        return Ok(ResetGameSummary {
            had_game: false,
            cancelled_countdown: false,
        });
    };

    let mut session = handle.write().await;
    let cancelled = session.reset_game();
    if let Some(generation) = cancelled {
        countdown_service::disarm(state, &session, generation);
    }

    info!(%scope, %caller, cancelled = cancelled.is_some(), "game reset");
    state.notifier().broadcast(
        &scope,
        Notice::GameReset {
            cancelled_generation: cancelled,
        },
    );

    Ok(ResetGameSummary {
        had_game: true,
        cancelled_countdown: cancelled.is_some(),
    })
}

/// Record `caller`'s vote for `target`, starting the countdown on majority.
pub async fn cast_vote(
    state: &SharedState,
    scope: ScopeId,
    caller: PlayerId,
    target: PlayerId,
) -> Result<VoteSummary, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    let handle = require_session(state, &scope)?;

    let mut session = handle.write().await;
    let now = Instant::now();
    let report = session.cast_vote(caller, target, now)?;
    info!(%scope, voter = %caller, %target, previous = ?report.previous, "vote cast");

    let tally = TallySummary::from(&report.tally);
    state.notifier().broadcast(
        &scope,
        Notice::VoteCast {
            voter: caller,
            target,
            previous: report.previous,
            tally: tally.clone(),
        },
    );

    if let Some(arm) = &report.armed {
        start_countdown(state, &handle, &mut session, arm, now)?;
    }

    Ok(VoteSummary {
        voter: caller,
        target: Some(target),
        previous: report.previous,
        countdown_started: report.armed.is_some(),
        tally,
        countdown: CountdownSnapshot::capture(session.countdown(), now),
    })
}

/// Withdraw `caller`'s vote. A running countdown keeps running.
pub async fn unvote(
    state: &SharedState,
    scope: ScopeId,
    caller: PlayerId,
) -> Result<VoteSummary, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    let handle = require_session(state, &scope)?;

    let mut session = handle.write().await;
    let previous = session
        .tally()
        .entries()
        .find(|(_, voters)| voters.contains(&caller))
        .map(|(target, _)| target);
    let tally = TallySummary::from(&session.unvote(caller)?);
    info!(%scope, voter = %caller, previous = ?previous, "vote withdrawn");
    state.notifier().broadcast(
        &scope,
        Notice::VoteCleared {
            voter: caller,
            tally: tally.clone(),
        },
    );

    Ok(VoteSummary {
        voter: caller,
        target: None,
        previous,
        countdown_started: false,
        tally,
        countdown: CountdownSnapshot::capture(session.countdown(), Instant::now()),
    })
}

/// Current tally of `scope`.
pub async fn tally(state: &SharedState, scope: ScopeId) -> Result<TallyResponse, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    let handle = require_session(state, &scope)?;

    let session = handle.read().await;
    Ok(TallyResponse {
        tally: TallySummary::from(&session.tally()),
        countdown: CountdownSnapshot::capture(session.countdown(), Instant::now()),
        scope,
    })
}

/// Start the countdown by hand.
pub async fn hammer(
    state: &SharedState,
    scope: ScopeId,
    caller: PlayerId,
) -> Result<HammerSummary, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    let handle = require_session(state, &scope)?;

    let mut session = handle.write().await;
    let now = Instant::now();
    let arm = session.hammer(caller, now)?;
    info!(%scope, %caller, generation = arm.generation, "hammer called");
    start_countdown(state, &handle, &mut session, &arm, now)?;

    Ok(HammerSummary {
        caller,
        countdown: CountdownSnapshot::capture(session.countdown(), now),
        tally: TallySummary::from(&session.tally()),
    })
}

/// Change the role name used by the next `startgame`.
pub async fn set_role(
    state: &SharedState,
    scope: ScopeId,
    caller: PlayerId,
    role_name: &str,
) -> Result<SetRoleSummary, ServiceError> {
    ensure_scope_allowed(state, &scope)?;
    require_moderator(state, caller, &scope).await?;

    let role_name = role_name.trim();
    if role_name.is_empty() {
        return Err(ServiceError::InvalidInput("role name must not be empty".into()));
    }

    let holders = state
        .membership()
        .list_role_holders(&scope, role_name)
        .await;
    if holders.is_none() {
        warn!(%scope, role = role_name, "player role set to a role missing from the scope");
    }

    let previous = state.player_role().await;
    state.set_player_role(role_name.to_string()).await;

    Ok(SetRoleSummary {
        role_name: role_name.to_string(),
        previous,
        role_found: holders.is_some(),
        holders: holders.map_or(0, |holders| holders.len()),
    })
}

/// Configuration and game state of `scope`.
pub async fn status(state: &SharedState, scope: ScopeId) -> Result<StatusSummary, ServiceError> {
    ensure_scope_allowed(state, &scope)?;

    let role_name = state.player_role().await;
    let holders = state
        .membership()
        .list_role_holders(&scope, &role_name)
        .await;

    let game = match state.session(&scope) {
        Some(handle) => {
            let session = handle.read().await;
            let tally = session.tally();
            Some(GameStatus {
                session_id: session.id(),
                created_at: format_system_time(session.created_at()),
                active_players: tally.active_players(),
                eliminated_players: session.players().eliminated_ids().len(),
                threshold: tally.threshold(),
                total_votes: tally.total_votes(),
                countdown: CountdownSnapshot::capture(session.countdown(), Instant::now()),
            })
        }
        None => None,
    };

    Ok(StatusSummary {
        scope,
        role_name,
        role_found: holders.is_some(),
        role_holders: holders.map(|holders| holders.len()),
        allowed_scopes: state
            .config()
            .allowed_scopes()
            .map(|scopes| scopes.iter().cloned().collect()),
        game,
    })
}

fn ensure_scope_allowed(state: &SharedState, scope: &ScopeId) -> Result<(), ServiceError> {
    if state.config().is_scope_allowed(scope) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "commands are not accepted in scope `{scope}`"
        )))
    }
}

async fn require_moderator(
    state: &SharedState,
    caller: PlayerId,
    scope: &ScopeId,
) -> Result<(), ServiceError> {
    if state.authorizer().is_moderator(caller, scope).await {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "player {caller} is not a moderator"
        )))
    }
}

fn require_session(state: &SharedState, scope: &ScopeId) -> Result<SessionHandle, ServiceError> {
    state
        .session(scope)
        .ok_or_else(|| ServiceError::InvalidState("no game in progress".into()))
}

/// Arm the timers of a countdown the session just started and announce it.
///
/// When arming fails the start is rolled back while the lock is still held.
fn start_countdown(
    state: &SharedState,
    handle: &SessionHandle,
    session: &mut GameSession,
    arm: &Arm,
    now: Instant,
) -> Result<(), ServiceError> {
    if let Err(err) = countdown_service::arm_timers(state, handle, session, arm) {
        session.abort_start(arm.generation);
        return Err(err.into());
    }
    state
        .notifier()
        .broadcast(session.scope(), countdown_service::started_notice(session, arm, now));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, countdown::CountdownStatus},
    };

    const MODERATOR: PlayerId = PlayerId(1);
    const SCOPE: &str = "guild/day";

    fn config(extra: &str) -> AppConfig {
        AppConfig::from_json(&format!(
            r#"{{
                {extra}
                "moderators": [1],
                "scopes": {{
                    "guild/day": {{
                        "roles": ["Town"],
                        "members": [
                            {{ "id": 10, "roles": ["i play mafia"] }},
                            {{ "id": 11, "roles": ["i play mafia"] }},
                            {{ "id": 12, "roles": ["i play mafia"] }},
                            {{ "id": 13, "roles": ["i play mafia"] }},
                            {{ "id": 14, "roles": ["i play mafia"] }},
                            {{ "id": 99, "roles": ["i play mafia"], "bot": true }}
                        ]
                    }}
                }}
            }}"#
        ))
        .unwrap()
    }

    fn scope() -> ScopeId {
        ScopeId::from(SCOPE)
    }

    async fn started() -> SharedState {
        let state = AppState::new(config(""));
        start_game(&state, scope(), MODERATOR).await.unwrap();
        state
    }

    #[tokio::test(start_paused = true)]
    async fn start_game_seeds_role_holders_without_bots() {
        let state = AppState::new(config(""));
        let response = start_game(&state, scope(), MODERATOR).await.unwrap();

        assert_eq!(response.players, (10..=14).map(PlayerId).collect::<Vec<_>>());
        assert_eq!(response.threshold, 3);
        assert!(matches!(
            start_game(&state, scope(), MODERATOR).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn start_game_requires_moderator_role_and_players() {
        let state = AppState::new(config(r#""min_players": 6,"#));
        assert!(matches!(
            start_game(&state, scope(), PlayerId(10)).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            start_game(&state, scope(), MODERATOR).await,
            Err(ServiceError::InvalidState(message)) if message.contains("at least 6")
        ));

        state.set_player_role("werewolf".into()).await;
        assert!(matches!(
            start_game(&state, scope(), MODERATOR).await,
            Err(ServiceError::InvalidState(message)) if message.contains("does not exist")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_need_a_game() {
        let state = AppState::new(config(""));
        let no_game = ServiceError::InvalidState("no game in progress".into());

        assert_eq!(
            cast_vote(&state, scope(), PlayerId(10), PlayerId(11)).await.unwrap_err(),
            no_game
        );
        assert_eq!(tally(&state, scope()).await.unwrap_err(), no_game);
        assert_eq!(hammer(&state, scope(), PlayerId(10)).await.unwrap_err(), no_game);

        let players = players(&state, scope()).await.unwrap();
        assert!(!players.game_running);
        assert_eq!(players.active.len(), 5);

        let reset = reset_game(&state, scope(), MODERATOR).await.unwrap();
        assert!(!reset.had_game);
    }

    #[tokio::test(start_paused = true)]
    async fn majority_vote_arms_the_countdown() {
        let state = started().await;
        for voter in [10, 11] {
            let summary = cast_vote(&state, scope(), PlayerId(voter), PlayerId(14))
                .await
                .unwrap();
            assert!(!summary.countdown_started);
        }
        let summary = cast_vote(&state, scope(), PlayerId(12), PlayerId(14))
            .await
            .unwrap();

        assert!(summary.countdown_started);
        assert_eq!(summary.countdown.status, CountdownStatus::Running);
        assert_eq!(summary.countdown.remaining.as_deref(), Some("24h 0m"));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_eliminates_the_leader_at_the_end() {
        let state = started().await;
        for voter in [10, 11, 12] {
            cast_vote(&state, scope(), PlayerId(voter), PlayerId(14))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_secs(24 * 3600 + 1)).await;

        let players = players(&state, scope()).await.unwrap();
        assert_eq!(players.eliminated, vec![PlayerId(14)]);
        let status = status(&state, scope()).await.unwrap();
        assert_eq!(
            status.game.unwrap().countdown.status,
            CountdownStatus::Resolved
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reset_votes_disarms_pending_timers() {
        let state = started().await;
        hammer(&state, scope(), PlayerId(10)).await.unwrap();
        cast_vote(&state, scope(), PlayerId(11), PlayerId(12))
            .await
            .unwrap();

        let reset = reset_votes(&state, scope(), MODERATOR).await.unwrap();
        assert!(reset.cancelled_countdown);

        tokio::time::sleep(Duration::from_secs(25 * 3600)).await;
        let players = players(&state, scope()).await.unwrap();
        assert!(players.eliminated.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hammer_refuses_a_second_start_and_outsiders() {
        let state = started().await;
        assert!(matches!(
            hammer(&state, scope(), PlayerId(77)).await,
            Err(ServiceError::NotEligible(_))
        ));
        hammer(&state, scope(), PlayerId(10)).await.unwrap();
        assert_eq!(
            hammer(&state, scope(), PlayerId(11)).await.unwrap_err(),
            ServiceError::AlreadyRunning
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unvote_reports_the_withdrawn_target() {
        let state = started().await;
        cast_vote(&state, scope(), PlayerId(10), PlayerId(11))
            .await
            .unwrap();

        let summary = unvote(&state, scope(), PlayerId(10)).await.unwrap();
        assert_eq!(summary.previous, Some(PlayerId(11)));
        assert!(summary.tally.entries.is_empty());
        assert!(matches!(
            unvote(&state, scope(), PlayerId(10)).await,
            Err(ServiceError::NoActiveVote(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn players_lists_prospective_holders_or_flags_a_missing_role() {
        let state = AppState::new(config(""));
        let prospective = players(&state, scope()).await.unwrap();
        assert!(!prospective.game_running);
        assert!(prospective.role_found);
        assert_eq!(prospective.active.len(), 5);

        set_role(&state, scope(), MODERATOR, "ghosts").await.unwrap();
        let missing = players(&state, scope()).await.unwrap();
        assert!(!missing.role_found);
        assert!(missing.active.is_empty());
        assert_eq!(missing.role_name, "ghosts");
    }

    #[tokio::test(start_paused = true)]
    async fn set_role_trims_and_reports_holders() {
        let state = AppState::new(config(""));
        let summary = set_role(&state, scope(), MODERATOR, "  town ").await.unwrap();
        assert_eq!(summary.role_name, "town");
        assert_eq!(summary.previous, "i play mafia");
        assert!(summary.role_found);
        assert_eq!(summary.holders, 0);

        let missing = set_role(&state, scope(), MODERATOR, "ghosts").await.unwrap();
        assert!(!missing.role_found);
        assert_eq!(state.player_role().await, "ghosts");

        assert!(matches!(
            set_role(&state, scope(), MODERATOR, "   ").await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            set_role(&state, scope(), PlayerId(10), "town").await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn scope_restriction_forbids_other_scopes() {
        let state = AppState::new(config(r#""allowed_scopes": ["guild/day"],"#));
        assert!(status(&state, scope()).await.is_ok());
        assert!(matches!(
            status(&state, ScopeId::from("guild/night")).await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
