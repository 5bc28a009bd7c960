use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::votes::VoteLedger;

/// Stable chat-platform identifier of a player (a 64-bit snowflake).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PlayerId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Whether a registered player can still take part in the vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    /// Player may vote and be voted for.
    Active,
    /// Player was eliminated; kept for display only.
    Eliminated,
}

/// Errors raised by [`PlayerRegistry`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The id is unknown or already eliminated.
    #[error("player {0} is not an active player")]
    NotFound(PlayerId),
}

/// Active and eliminated players of one game.
#[derive(Debug, Clone, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, PlayerStatus>,
}

impl PlayerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every player with `ids`, all active.
    ///
    /// Callers are responsible for refusing this while a countdown runs; the
    /// registry has no view of the countdown.
    pub fn initialize(&mut self, ids: impl IntoIterator<Item = PlayerId>) {
        self.players = ids
            .into_iter()
            .map(|id| (id, PlayerStatus::Active))
            .collect();
    }

    /// Mark `id` as eliminated and drop every vote that references it.
    pub fn eliminate(&mut self, id: PlayerId, ledger: &mut VoteLedger) -> Result<(), RegistryError> {
        match self.players.get_mut(&id) {
            Some(status @ PlayerStatus::Active) => {
                *status = PlayerStatus::Eliminated;
                ledger.prune_references_to(id);
                Ok(())
            }
            _ => Err(RegistryError::NotFound(id)),
        }
    }

    /// True when `id` is registered and not eliminated.
    pub fn is_active(&self, id: PlayerId) -> bool {
        matches!(self.players.get(&id), Some(PlayerStatus::Active))
    }

    /// Status of `id`, if it was ever registered in this game.
    pub fn status(&self, id: PlayerId) -> Option<PlayerStatus> {
        self.players.get(&id).copied()
    }

    /// Ids of every active player, in ascending order.
    pub fn active_ids(&self) -> BTreeSet<PlayerId> {
        self.ids_with(PlayerStatus::Active)
    }

    /// Ids of every eliminated player, in ascending order.
    pub fn eliminated_ids(&self) -> BTreeSet<PlayerId> {
        self.ids_with(PlayerStatus::Eliminated)
    }

    /// Number of active players.
    pub fn active_count(&self) -> usize {
        self.players
            .values()
            .filter(|status| **status == PlayerStatus::Active)
            .count()
    }

    /// Vote resets leave player statuses untouched, eliminations included.
    pub fn reset_votes_only(&mut self) {}

    /// Forget every player.
    pub fn reset_game(&mut self) {
        self.players.clear();
    }

    fn ids_with(&self, wanted: PlayerStatus) -> BTreeSet<PlayerId> {
        self.players
            .iter()
            .filter(|(_, status)| **status == wanted)
            .map(|(id, _)| *id)
            .collect()
    }
}
