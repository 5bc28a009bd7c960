use std::collections::BTreeMap;

use indexmap::IndexMap;
use thiserror::Error;

use crate::state::players::{PlayerId, PlayerRegistry};

/// Number of votes on a single target needed to reach majority with `active_players` alive.
pub fn majority_threshold(active_players: usize) -> usize {
    active_players / 2 + 1
}

/// Errors raised while recording or clearing votes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Voter or target is not an active player.
    #[error("player {0} is not an active player")]
    NotEligible(PlayerId),
    /// Voter tried to vote for themselves.
    #[error("players cannot vote for themselves")]
    SelfVote,
    /// The voter has no recorded vote to clear.
    #[error("player {0} has no active vote")]
    NoActiveVote(PlayerId),
}

/// Result of a successful [`VoteLedger::cast_vote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    /// Target the voter pointed at before this vote, if any.
    pub previous: Option<PlayerId>,
    /// Tally after the vote was recorded.
    pub tally: Tally,
}

/// Voter to target edges; each voter holds at most one vote.
#[derive(Debug, Clone, Default)]
pub struct VoteLedger {
    votes: BTreeMap<PlayerId, PlayerId>,
}

impl VoteLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `voter`'s vote for `target`, replacing any earlier vote.
    pub fn cast_vote(
        &mut self,
        registry: &PlayerRegistry,
        voter: PlayerId,
        target: PlayerId,
    ) -> Result<CastVote, LedgerError> {
        if !registry.is_active(voter) {
            return Err(LedgerError::NotEligible(voter));
        }
        if !registry.is_active(target) {
            return Err(LedgerError::NotEligible(target));
        }
        if voter == target {
            return Err(LedgerError::SelfVote);
        }

        let previous = self.votes.insert(voter, target);
        Ok(CastVote {
            previous,
            tally: self.tally(registry),
        })
    }

    /// Remove `voter`'s current vote.
    pub fn clear_vote(
        &mut self,
        registry: &PlayerRegistry,
        voter: PlayerId,
    ) -> Result<Tally, LedgerError> {
        self.votes
            .remove(&voter)
            .ok_or(LedgerError::NoActiveVote(voter))?;
        Ok(self.tally(registry))
    }

    /// Target currently chosen by `voter`.
    pub fn vote_of(&self, voter: PlayerId) -> Option<PlayerId> {
        self.votes.get(&voter).copied()
    }

    /// Number of recorded votes.
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    /// True when nobody has voted.
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Drop every vote cast by or aimed at `id`.
    pub fn prune_references_to(&mut self, id: PlayerId) {
        self.votes
            .retain(|voter, target| *voter != id && *target != id);
    }

    /// Drop every vote.
    pub fn clear_all(&mut self) {
        self.votes.clear();
    }

    /// Compute the current tally against the registry's active players.
    pub fn tally(&self, registry: &PlayerRegistry) -> Tally {
        let mut grouped: BTreeMap<PlayerId, Vec<PlayerId>> = BTreeMap::new();
        for (voter, target) in &self.votes {
            grouped.entry(*target).or_default().push(*voter);
        }

        let mut ordered: Vec<(PlayerId, Vec<PlayerId>)> = grouped.into_iter().collect();
        // Stable sort keeps ascending target ids among equal counts.
        ordered.sort_by(|(_, left), (_, right)| right.len().cmp(&left.len()));

        let unvoted = registry
            .active_ids()
            .into_iter()
            .filter(|id| ordered.iter().all(|(target, _)| target != id))
            .collect();

        Tally {
            entries: ordered.into_iter().collect(),
            unvoted,
            active_players: registry.active_count(),
        }
    }
}

/// Snapshot of who votes for whom, ordered by descending vote count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    entries: IndexMap<PlayerId, Vec<PlayerId>>,
    unvoted: Vec<PlayerId>,
    active_players: usize,
}

impl Tally {
    /// Iterate over `(target, voters)` pairs, most voted first.
    pub fn entries(&self) -> impl Iterator<Item = (PlayerId, &[PlayerId])> {
        self.entries
            .iter()
            .map(|(target, voters)| (*target, voters.as_slice()))
    }

    /// Votes currently aimed at `target`.
    pub fn count(&self, target: PlayerId) -> usize {
        self.entries.get(&target).map_or(0, Vec::len)
    }

    /// Active players nobody is voting for.
    pub fn unvoted(&self) -> &[PlayerId] {
        &self.unvoted
    }

    /// Active player count the tally was computed against.
    pub fn active_players(&self) -> usize {
        self.active_players
    }

    /// Votes needed for majority.
    pub fn threshold(&self) -> usize {
        majority_threshold(self.active_players)
    }

    /// Total number of recorded votes.
    pub fn total_votes(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// True when no vote is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First target holding at least the majority threshold.
    pub fn majority_target(&self) -> Option<PlayerId> {
        let threshold = self.threshold();
        self.entries
            .iter()
            .find(|(_, voters)| voters.len() >= threshold)
            .map(|(target, _)| *target)
    }

    /// Every target tied for the highest count, with that count. Empty when nobody voted.
    pub fn leaders(&self) -> (Vec<PlayerId>, usize) {
        let Some(top) = self.entries.values().map(Vec::len).max() else {
            return (Vec::new(), 0);
        };
        let leaders = self
            .entries
            .iter()
            .filter(|(_, voters)| voters.len() == top)
            .map(|(target, _)| *target)
            .collect();
        (leaders, top)
    }
}
