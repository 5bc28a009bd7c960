use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use mafiadon_back::{
    config::AppConfig,
    dto::{game::OutcomeDto, sse::Notice},
    gateway::{
        NotificationSink,
        directory::{ConfigAuthorizer, StaticDirectory},
    },
    routes,
    scheduler::TokioScheduler,
    services::game_service,
    state::{AppState, Collaborators, ScopeId, SharedState, players::PlayerId},
};
use serde_json::{Value, json};
use tokio::time::sleep;
use tower::ServiceExt;

const MODERATOR: PlayerId = PlayerId(100);
const A: PlayerId = PlayerId(1);
const B: PlayerId = PlayerId(2);
const C: PlayerId = PlayerId(3);
const D: PlayerId = PlayerId(4);
const E: PlayerId = PlayerId(5);

const HOUR: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct RecordingSink {
    notices: Mutex<Vec<(ScopeId, Notice)>>,
}

impl RecordingSink {
    fn names(&self) -> Vec<&'static str> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|(_, notice)| notice.event_name())
            .collect()
    }

    fn take(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap()
            .drain(..)
            .map(|(_, notice)| notice)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn broadcast(&self, scope: &ScopeId, notice: Notice) {
        self.notices.lock().unwrap().push((scope.clone(), notice));
    }
}

fn config() -> AppConfig {
    AppConfig::from_json(
        r#"{
            "moderators": [100],
            "scopes": {
                "guild/day": {
                    "members": [
                        { "id": 1, "roles": ["i play mafia"] },
                        { "id": 2, "roles": ["i play mafia"] },
                        { "id": 3, "roles": ["i play mafia"] },
                        { "id": 4, "roles": ["i play mafia"] },
                        { "id": 5, "roles": ["i play mafia"] },
                        { "id": 100, "roles": [] }
                    ]
                }
            }
        }"#,
    )
    .unwrap()
}

fn state_with_sink() -> (SharedState, Arc<RecordingSink>) {
    let config = config();
    let sink = Arc::new(RecordingSink::default());
    let collaborators = Collaborators {
        membership: Arc::new(StaticDirectory::from_config(&config)),
        authorizer: Arc::new(ConfigAuthorizer::from_config(&config)),
        notifier: sink.clone(),
        scheduler: Arc::new(TokioScheduler::new()),
    };
    (AppState::with_collaborators(config, collaborators), sink)
}

fn scope() -> ScopeId {
    ScopeId::from("guild/day")
}

#[tokio::test(start_paused = true)]
async fn majority_countdown_eliminates_the_leader_after_a_day() {
    let (state, sink) = state_with_sink();
    game_service::start_game(&state, scope(), MODERATOR)
        .await
        .unwrap();

    for voter in [A, B] {
        let summary = game_service::cast_vote(&state, scope(), voter, D)
            .await
            .unwrap();
        assert!(!summary.countdown_started);
    }
    let third = game_service::cast_vote(&state, scope(), C, D).await.unwrap();
    assert!(third.countdown_started);
    game_service::cast_vote(&state, scope(), E, D).await.unwrap();
    assert_eq!(
        sink.names(),
        vec![
            "game_started",
            "vote_cast",
            "vote_cast",
            "vote_cast",
            "countdown_started",
            "vote_cast"
        ]
    );
    sink.take();

    sleep(4 * HOUR + Duration::from_secs(1)).await;
    let notices = sink.take();
    assert_eq!(notices.len(), 1);
    match &notices[0] {
        Notice::CountdownUpdate {
            remaining, tally, ..
        } => {
            assert_eq!(remaining, "20h 0m");
            assert_eq!(tally.entries[0].target, D);
            assert_eq!(tally.entries[0].votes, 4);
        }
        other => panic!("expected a countdown update, got {other:?}"),
    }

    sleep(20 * HOUR).await;
    let notices = sink.take();
    assert_eq!(
        notices
            .iter()
            .filter(|notice| matches!(notice, Notice::CountdownUpdate { .. }))
            .count(),
        4
    );
    let Some(Notice::HammerResolved { outcome, tally, .. }) = notices.last() else {
        panic!("expected a resolution, got {notices:?}");
    };
    assert!(matches!(outcome, OutcomeDto::Eliminated { target, votes: 4 } if *target == D));
    assert_eq!(tally.active_players, 4);

    let players = game_service::players(&state, scope()).await.unwrap();
    assert_eq!(players.eliminated, vec![D]);
}

#[tokio::test(start_paused = true)]
async fn reset_votes_silences_the_cancelled_countdown() {
    let (state, sink) = state_with_sink();
    game_service::start_game(&state, scope(), MODERATOR)
        .await
        .unwrap();
    let first = game_service::hammer(&state, scope(), A).await.unwrap();
    game_service::cast_vote(&state, scope(), B, C).await.unwrap();

    sleep(3 * HOUR).await;
    game_service::reset_votes(&state, scope(), MODERATOR)
        .await
        .unwrap();
    sink.take();

    let second = game_service::hammer(&state, scope(), A).await.unwrap();
    assert!(second.countdown.generation > first.countdown.generation);

    // The first countdown would have resolved 21 hours from here.
    sleep(22 * HOUR).await;
    assert!(
        sink.take()
            .iter()
            .all(|notice| !matches!(notice, Notice::HammerResolved { .. })),
        "cancelled countdown must not resolve"
    );

    sleep(3 * HOUR).await;
    let notices = sink.take();
    let Some(Notice::HammerResolved { outcome, .. }) = notices.last() else {
        panic!("expected the second countdown to resolve, got {notices:?}");
    };
    assert!(matches!(outcome, OutcomeDto::NoVotes));
    let players = game_service::players(&state, scope()).await.unwrap();
    assert!(players.eliminated.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reset_game_drops_pending_timers() {
    let (state, sink) = state_with_sink();
    game_service::start_game(&state, scope(), MODERATOR)
        .await
        .unwrap();
    game_service::hammer(&state, scope(), A).await.unwrap();

    let reset = game_service::reset_game(&state, scope(), MODERATOR)
        .await
        .unwrap();
    assert!(reset.had_game && reset.cancelled_countdown);
    sink.take();

    sleep(25 * HOUR).await;
    assert!(sink.take().is_empty());
    assert!(game_service::tally(&state, scope()).await.is_err());
}

async fn call(state: &SharedState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |body| Body::from(body.to_string())))
        .unwrap();
    let response = routes::router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test(start_paused = true)]
async fn http_commands_map_errors_to_statuses() {
    let (state, _sink) = state_with_sink();

    let (status, body) = call(&state, "GET", "/scopes/guild%2Fday/tally", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], json!("conflict: invalid state: no game in progress"));

    let (status, _) = call(
        &state,
        "POST",
        "/scopes/guild%2Fday/startgame",
        Some(json!({ "caller": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &state,
        "POST",
        "/scopes/guild%2Fday/startgame",
        Some(json!({ "caller": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["threshold"], json!(3));

    let (status, _) = call(
        &state,
        "POST",
        "/scopes/guild%2Fday/vote",
        Some(json!({ "caller": 1, "target": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &state,
        "POST",
        "/scopes/guild%2Fday/vote",
        Some(json!({ "caller": 0, "target": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &state,
        "POST",
        "/scopes/guild%2Fday/vote",
        Some(json!({ "caller": 1, "target": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tally"]["entries"][0]["target"], json!(2));

    let (status, body) = call(&state, "GET", "/scopes/guild%2Fday/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role_holders"], json!(5));
    assert_eq!(body["game"]["total_votes"], json!(1));

    let (status, body) = call(&state, "GET", "/healthcheck", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_games"], json!(1));
}
