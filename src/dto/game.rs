use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        format_remaining, format_system_time,
        validation::{validate_player_id, validate_role_name},
    },
    state::{
        ScopeId,
        countdown::{
            Countdown, CountdownOutcome, CountdownStatus, Generation, NoEliminationReason,
            Resolution, TriggerReason,
        },
        players::PlayerId,
        votes::Tally,
    },
};

/// Payload of commands that only need to know who is calling.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CallerRequest {
    #[validate(custom(function = "validate_player_id"))]
    pub caller: PlayerId,
}

/// Payload of commands aimed at another player (`vote`, `eliminate`).
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TargetRequest {
    #[validate(custom(function = "validate_player_id"))]
    pub caller: PlayerId,
    #[validate(custom(function = "validate_player_id"))]
    pub target: PlayerId,
}

/// Payload of `setrole`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SetRoleRequest {
    #[validate(custom(function = "validate_player_id"))]
    pub caller: PlayerId,
    #[validate(custom(function = "validate_role_name"))]
    pub role_name: String,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Votes received by one target.
pub struct TallyEntryDto {
    pub target: PlayerId,
    pub votes: usize,
    pub voters: Vec<PlayerId>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Public projection of a tally, most voted target first.
pub struct TallySummary {
    pub entries: Vec<TallyEntryDto>,
    pub unvoted: Vec<PlayerId>,
    pub active_players: usize,
    pub threshold: usize,
    pub total_votes: usize,
}

impl From<&Tally> for TallySummary {
    fn from(tally: &Tally) -> Self {
        Self {
            entries: tally
                .entries()
                .map(|(target, voters)| TallyEntryDto {
                    target,
                    votes: voters.len(),
                    voters: voters.to_vec(),
                })
                .collect(),
            unvoted: tally.unvoted().to_vec(),
            active_players: tally.active_players(),
            threshold: tally.threshold(),
            total_votes: tally.total_votes(),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
/// How a countdown ended.
pub enum OutcomeDto {
    /// A single leader was eliminated.
    Eliminated {
        target: PlayerId,
        votes: usize,
    },
    /// Nobody had been voted for.
    NoVotes,
    /// Several targets shared the lead, nobody was eliminated.
    Tie {
        tied: Vec<PlayerId>,
        votes: usize,
    },
    /// The countdown was cancelled by a reset.
    Cancelled,
}

impl From<&Resolution> for OutcomeDto {
    fn from(resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Eliminated { target, votes } => OutcomeDto::Eliminated {
                target: *target,
                votes: *votes,
            },
            Resolution::NoElimination(NoEliminationReason::NoVotes) => OutcomeDto::NoVotes,
            Resolution::NoElimination(NoEliminationReason::Tie { tied, votes }) => {
                OutcomeDto::Tie {
                    tied: tied.clone(),
                    votes: *votes,
                }
            }
        }
    }
}

impl From<&CountdownOutcome> for OutcomeDto {
    fn from(outcome: &CountdownOutcome) -> Self {
        match outcome {
            CountdownOutcome::Resolved(resolution) => resolution.into(),
            CountdownOutcome::Cancelled => OutcomeDto::Cancelled,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Countdown state as seen at a given instant.
pub struct CountdownSnapshot {
    pub status: CountdownStatus,
    pub generation: Generation,
    pub reason: Option<TriggerReason>,
    pub started_at: Option<String>,
    pub ends_at: Option<String>,
    pub remaining_secs: Option<u64>,
    /// Remaining time rendered as `3h 12m`, `5m 2s` or `42s`.
    pub remaining: Option<String>,
    pub last_outcome: Option<OutcomeDto>,
}

impl CountdownSnapshot {
    /// Capture `countdown` at `now`.
    pub fn capture(countdown: &Countdown, now: Instant) -> Self {
        let remaining = countdown.remaining(now);
        Self {
            status: countdown.status(),
            generation: countdown.generation(),
            reason: countdown.reason(),
            started_at: countdown.started_at().map(format_system_time),
            ends_at: countdown.ends_at().map(format_system_time),
            remaining_secs: remaining.map(|left| left.as_secs()),
            remaining: remaining.map(format_remaining),
            last_outcome: countdown.last_outcome().map(Into::into),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Returned once a game has been started.
pub struct StartGameResponse {
    pub scope: ScopeId,
    pub session_id: Uuid,
    pub created_at: String,
    pub role_name: String,
    pub players: Vec<PlayerId>,
    pub threshold: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Player list of a scope; prospective role holders when no game runs.
pub struct PlayersSummary {
    pub scope: ScopeId,
    pub game_running: bool,
    pub role_name: String,
    /// False when no game runs and the player role does not exist in the scope.
    pub role_found: bool,
    pub active: Vec<PlayerId>,
    pub eliminated: Vec<PlayerId>,
    pub threshold: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Result of `vote` or `unvote`.
pub struct VoteSummary {
    pub voter: PlayerId,
    /// Current target; `None` after an unvote.
    pub target: Option<PlayerId>,
    /// Target chosen before this command.
    pub previous: Option<PlayerId>,
    /// True when this vote started the countdown.
    pub countdown_started: bool,
    pub tally: TallySummary,
    pub countdown: CountdownSnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
/// Result of a moderator elimination.
pub struct EliminationSummary {
    pub target: PlayerId,
    pub eliminated: Vec<PlayerId>,
    pub tally: TallySummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Result of `resetvotes`.
pub struct ResetVotesSummary {
    pub cancelled_countdown: bool,
    pub active_players: Vec<PlayerId>,
    pub threshold: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Result of `resetgame`.
pub struct ResetGameSummary {
    pub had_game: bool,
    pub cancelled_countdown: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Current tally with the countdown state.
pub struct TallyResponse {
    pub scope: ScopeId,
    pub tally: TallySummary,
    pub countdown: CountdownSnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
/// Result of a manual countdown start.
pub struct HammerSummary {
    pub caller: PlayerId,
    pub countdown: CountdownSnapshot,
    pub tally: TallySummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Result of `setrole`.
pub struct SetRoleSummary {
    pub role_name: String,
    pub previous: String,
    pub role_found: bool,
    pub holders: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Game part of a status report.
pub struct GameStatus {
    pub session_id: Uuid,
    pub created_at: String,
    pub active_players: usize,
    pub eliminated_players: usize,
    pub threshold: usize,
    pub total_votes: usize,
    pub countdown: CountdownSnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
/// Bot configuration and game state of a scope.
pub struct StatusSummary {
    pub scope: ScopeId,
    pub role_name: String,
    pub role_found: bool,
    /// Holders of the player role; `None` when the role is missing.
    pub role_holders: Option<usize>,
    /// Scopes commands are restricted to; `None` when every scope is allowed.
    pub allowed_scopes: Option<Vec<ScopeId>>,
    pub game: Option<GameStatus>,
}
