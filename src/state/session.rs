use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::state::{
    ScopeId,
    countdown::{Arm, Countdown, CountdownError, CountdownTiming, Generation, Resolution},
    players::{PlayerId, PlayerRegistry, RegistryError},
    votes::{LedgerError, Tally, VoteLedger},
};

/// Errors raised by [`GameSession`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Player registry rejected the operation.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Vote ledger rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Countdown rejected the operation.
    #[error(transparent)]
    Countdown(#[from] CountdownError),
    /// Operation is not allowed in the current state.
    #[error("{0}")]
    InvalidState(String),
}

/// Outcome of a recorded vote.
#[derive(Debug, Clone)]
pub struct VoteReport {
    /// Tally after the vote.
    pub tally: Tally,
    /// Target the voter had chosen before.
    pub previous: Option<PlayerId>,
    /// Timers to arm when this vote started the countdown.
    pub armed: Option<Arm>,
}

/// Snapshot taken when a periodic broadcast fires.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Generation the broadcast belongs to.
    pub generation: Generation,
    /// Tally at fire time.
    pub tally: Tally,
    /// Time left before resolution.
    pub remaining: Duration,
}

/// Outcome of the countdown's end, already applied to the session.
#[derive(Debug, Clone)]
pub struct ResolutionReport {
    /// Generation that resolved.
    pub generation: Generation,
    /// Decision taken.
    pub resolution: Resolution,
    /// Tally the decision was taken on.
    pub final_tally: Tally,
    /// Tally once the elimination (if any) was applied.
    pub tally_after: Tally,
}

/// Voting state of one game in one scope.
#[derive(Debug)]
pub struct GameSession {
    id: Uuid,
    scope: ScopeId,
    created_at: SystemTime,
    registry: PlayerRegistry,
    ledger: VoteLedger,
    countdown: Countdown,
}

impl GameSession {
    /// Build an empty session for `scope`.
    pub fn new(scope: ScopeId, timing: CountdownTiming) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            created_at: SystemTime::now(),
            registry: PlayerRegistry::new(),
            ledger: VoteLedger::new(),
            countdown: Countdown::new(timing),
        }
    }

    /// Unique identifier of this session, used to key its timers.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Scope the session belongs to.
    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Creation time of the session.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Registered players.
    pub fn players(&self) -> &PlayerRegistry {
        &self.registry
    }

    /// Countdown controller.
    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Current tally.
    pub fn tally(&self) -> Tally {
        self.ledger.tally(&self.registry)
    }

    /// Seed the registry with `ids`, dropping any previous votes.
    pub fn initialize_players(
        &mut self,
        ids: impl IntoIterator<Item = PlayerId>,
    ) -> Result<(), SessionError> {
        if self.countdown.is_running() {
            return Err(SessionError::InvalidState(
                "cannot reseed players while a countdown is running".into(),
            ));
        }
        self.ledger.clear_all();
        self.registry.initialize(ids);
        Ok(())
    }

    /// Record a vote and start the countdown when it creates a majority.
    pub fn cast_vote(
        &mut self,
        voter: PlayerId,
        target: PlayerId,
        now: Instant,
    ) -> Result<VoteReport, SessionError> {
        let cast = self.ledger.cast_vote(&self.registry, voter, target)?;
        let armed = self.countdown.evaluate_auto_trigger(&cast.tally, now);
        Ok(VoteReport {
            tally: cast.tally,
            previous: cast.previous,
            armed,
        })
    }

    /// Withdraw `voter`'s vote. A running countdown is left untouched.
    pub fn unvote(&mut self, voter: PlayerId) -> Result<Tally, SessionError> {
        if !self.registry.is_active(voter) {
            return Err(LedgerError::NotEligible(voter).into());
        }
        Ok(self.ledger.clear_vote(&self.registry, voter)?)
    }

    /// Eliminate `target` by moderator decision.
    pub fn eliminate(&mut self, target: PlayerId) -> Result<Tally, SessionError> {
        self.registry.eliminate(target, &mut self.ledger)?;
        Ok(self.tally())
    }

    /// Start the countdown by hand on behalf of `caller`.
    pub fn hammer(&mut self, caller: PlayerId, now: Instant) -> Result<Arm, SessionError> {
        if !self.registry.is_active(caller) {
            return Err(LedgerError::NotEligible(caller).into());
        }
        Ok(self.countdown.start_manual(now)?)
    }

    /// Clear every vote and cancel the countdown; eliminations are kept.
    ///
    /// Returns the generation whose timers must be dropped, if one was running.
    pub fn reset_votes(&mut self) -> Option<Generation> {
        let cancelled = self.cancel_running();
        self.ledger.clear_all();
        self.registry.reset_votes_only();
        cancelled
    }

    /// Clear votes, players and the countdown.
    pub fn reset_game(&mut self) -> Option<Generation> {
        let cancelled = self.cancel_running();
        self.ledger.clear_all();
        self.registry.reset_game();
        cancelled
    }

    /// Undo a countdown start whose timers could not be armed.
    pub fn abort_start(&mut self, generation: Generation) {
        self.countdown.abort_start(generation);
    }

    /// Snapshot for a periodic broadcast armed for `generation`.
    pub fn tick(&self, generation: Generation, now: Instant) -> Result<TickReport, CountdownError> {
        self.countdown.ensure_current(generation)?;
        Ok(TickReport {
            generation,
            tally: self.tally(),
            remaining: self.countdown.remaining(now).unwrap_or_default(),
        })
    }

    /// Resolve the countdown armed for `generation` and apply the elimination.
    pub fn resolve(&mut self, generation: Generation) -> Result<ResolutionReport, CountdownError> {
        let final_tally = self.tally();
        let resolution = self.countdown.resolve(generation, &final_tally)?;

        if let Resolution::Eliminated { target, .. } = &resolution {
            // Targets in the tally are always active, so this cannot miss.
            let _ = self.registry.eliminate(*target, &mut self.ledger);
        }

        Ok(ResolutionReport {
            generation,
            resolution,
            final_tally,
            tally_after: self.tally(),
        })
    }

    fn cancel_running(&mut self) -> Option<Generation> {
        if self.countdown.is_running() {
            self.countdown.cancel().ok()
        } else {
            None
        }
    }
}
