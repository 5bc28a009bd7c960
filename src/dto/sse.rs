use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::game::{OutcomeDto, TallySummary},
    state::{
        ScopeId,
        countdown::{Generation, TriggerReason},
        players::PlayerId,
    },
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// Scope the event belongs to; `None` for connection-level events.
    pub scope: Option<ScopeId>,
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already rendered data field.
    pub fn new(scope: Option<ScopeId>, event: Option<String>, data: String) -> Self {
        Self { scope, event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(scope: Option<ScopeId>, event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            scope,
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Scope the stream is filtered on, or `None` for every scope.
    pub scope: Option<ScopeId>,
    /// Human-readable message confirming the subscription.
    pub message: String,
}

/// Announcement published to the players of a scope.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// A moderator started a game.
    GameStarted {
        players: Vec<PlayerId>,
        threshold: usize,
    },
    /// A vote was recorded or moved.
    VoteCast {
        voter: PlayerId,
        target: PlayerId,
        previous: Option<PlayerId>,
        tally: TallySummary,
    },
    /// A vote was withdrawn.
    VoteCleared {
        voter: PlayerId,
        tally: TallySummary,
    },
    /// A moderator eliminated a player.
    PlayerEliminated {
        target: PlayerId,
        tally: TallySummary,
    },
    /// The countdown started, by majority or by hand.
    CountdownStarted {
        generation: Generation,
        reason: TriggerReason,
        ends_at: Option<String>,
        remaining: String,
        tally: TallySummary,
    },
    /// Periodic reminder while the countdown runs.
    CountdownUpdate {
        generation: Generation,
        remaining_secs: u64,
        remaining: String,
        tally: TallySummary,
    },
    /// The countdown reached its end.
    HammerResolved {
        generation: Generation,
        outcome: OutcomeDto,
        final_tally: TallySummary,
        tally: TallySummary,
    },
    /// Votes were cleared by a moderator; eliminations stand.
    VotesReset {
        cancelled_generation: Option<Generation>,
        active_players: usize,
        threshold: usize,
    },
    /// The game was discarded.
    GameReset {
        cancelled_generation: Option<Generation>,
    },
}

impl Notice {
    /// SSE event name carrying this notice.
    pub fn event_name(&self) -> &'static str {
        match self {
            Notice::GameStarted { .. } => "game_started",
            Notice::VoteCast { .. } => "vote_cast",
            Notice::VoteCleared { .. } => "vote_cleared",
            Notice::PlayerEliminated { .. } => "player_eliminated",
            Notice::CountdownStarted { .. } => "countdown_started",
            Notice::CountdownUpdate { .. } => "countdown_update",
            Notice::HammerResolved { .. } => "hammer_resolved",
            Notice::VotesReset { .. } => "votes_reset",
            Notice::GameReset { .. } => "game_reset",
        }
    }
}
