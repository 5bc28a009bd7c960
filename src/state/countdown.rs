//! Elimination countdown ("hammer") state machine.
//!
//! The controller only decides; arming timers is left to the caller, which
//! receives an [`Arm`] describing what to schedule. Every scheduled callback
//! carries the generation it was armed for, and the controller refuses to act
//! on a generation that is no longer current.

use std::time::{Duration, SystemTime};

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use utoipa::ToSchema;

use crate::state::{players::PlayerId, votes::Tally};

/// Monotonic counter identifying one arming of the countdown.
pub type Generation = u64;

/// Default total length of a countdown.
pub const DEFAULT_COUNTDOWN_DURATION: Duration = Duration::from_secs(24 * 60 * 60);
/// Default spacing of the periodic tally broadcasts.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);
/// Longest countdown a configuration may ask for.
pub const MAX_COUNTDOWN_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Shortest non-zero spacing between tally broadcasts.
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Why the countdown was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// A target reached majority.
    Auto,
    /// A player called the hammer by hand.
    Manual,
}

/// Lifecycle of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CountdownStatus {
    /// Nothing scheduled.
    Idle,
    /// Timers are armed.
    Running,
    /// The last countdown reached its end.
    Resolved,
    /// The last countdown was cancelled before its end.
    Cancelled,
}

/// Why a resolution eliminated nobody.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoEliminationReason {
    /// No vote was recorded when the countdown ended.
    NoVotes,
    /// Several targets shared the highest count.
    Tie {
        /// Tied targets, in tally order.
        tied: Vec<PlayerId>,
        /// Vote count each tied target holds.
        votes: usize,
    },
}

/// Decision reached at the end of a countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A single target held the most votes.
    Eliminated {
        /// Player to eliminate.
        target: PlayerId,
        /// Votes that target held.
        votes: usize,
    },
    /// Nobody is eliminated.
    NoElimination(NoEliminationReason),
}

/// Terminal record of the previous countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// The countdown ran to its end.
    Resolved(Resolution),
    /// The countdown was cancelled by a reset.
    Cancelled,
}

/// Durations governing a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTiming {
    /// Delay between start and resolution.
    pub duration: Duration,
    /// Delay between periodic tally broadcasts.
    pub update_interval: Duration,
}

impl Default for CountdownTiming {
    fn default() -> Self {
        Self {
            duration: DEFAULT_COUNTDOWN_DURATION,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

/// Reasons a [`CountdownTiming`] is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimingError {
    /// The countdown would resolve immediately.
    #[error("countdown duration must be greater than zero")]
    ZeroDuration,
    /// The countdown exceeds [`MAX_COUNTDOWN_DURATION`].
    #[error("countdown duration {0:?} exceeds 30 days")]
    DurationTooLong(Duration),
    /// Broadcasts would be closer than [`MIN_UPDATE_INTERVAL`].
    #[error("update interval {0:?} is below one minute")]
    IntervalTooShort(Duration),
}

impl CountdownTiming {
    /// Check the bounds a countdown can safely be armed with. A zero interval disables updates.
    pub fn validate(&self) -> Result<(), TimingError> {
        if self.duration.is_zero() {
            return Err(TimingError::ZeroDuration);
        }
        if self.duration > MAX_COUNTDOWN_DURATION {
            return Err(TimingError::DurationTooLong(self.duration));
        }
        if !self.update_interval.is_zero() && self.update_interval < MIN_UPDATE_INTERVAL {
            return Err(TimingError::IntervalTooShort(self.update_interval));
        }
        Ok(())
    }

    /// Offsets from start at which a tally broadcast fires, strictly before the end.
    pub fn update_offsets(&self) -> Vec<Duration> {
        if self.update_interval.is_zero() {
            return Vec::new();
        }

        let mut offsets = Vec::new();
        let mut next = Some(self.update_interval);
        while let Some(offset) = next.filter(|offset| *offset < self.duration) {
            offsets.push(offset);
            next = offset.checked_add(self.update_interval);
        }
        offsets
    }
}

/// Timers a freshly started countdown needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm {
    /// Generation the timers belong to.
    pub generation: Generation,
    /// Why the countdown started.
    pub reason: TriggerReason,
    /// Offsets of the periodic broadcasts.
    pub updates: Vec<Duration>,
    /// Offset of the resolution.
    pub resolve_after: Duration,
}

/// Errors raised by [`Countdown`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CountdownError {
    /// A countdown is already running.
    #[error("a countdown is already running")]
    AlreadyRunning,
    /// No countdown is running.
    #[error("no countdown is running")]
    NotRunning,
    /// A callback fired for a generation that was cancelled or replaced.
    #[error("stale countdown generation {got} (current {current})")]
    Stale {
        /// Generation currently armed.
        current: Generation,
        /// Generation carried by the callback.
        got: Generation,
    },
}

#[derive(Debug, Clone, Copy)]
struct Started {
    reason: TriggerReason,
    at: Instant,
    wall: SystemTime,
}

/// Countdown controller owned by a game session.
#[derive(Debug, Clone)]
pub struct Countdown {
    status: CountdownStatus,
    generation: Generation,
    timing: CountdownTiming,
    started: Option<Started>,
    last_outcome: Option<CountdownOutcome>,
}

impl Countdown {
    /// Create an idle countdown with the given timing.
    pub fn new(timing: CountdownTiming) -> Self {
        Self {
            status: CountdownStatus::Idle,
            generation: 0,
            timing,
            started: None,
            last_outcome: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> CountdownStatus {
        self.status
    }

    /// Current generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Configured timing.
    pub fn timing(&self) -> CountdownTiming {
        self.timing
    }

    /// True while timers are armed.
    pub fn is_running(&self) -> bool {
        self.status == CountdownStatus::Running
    }

    /// Why the running (or last resolved) countdown started.
    pub fn reason(&self) -> Option<TriggerReason> {
        self.started.map(|started| started.reason)
    }

    /// Wall-clock start of the running (or last resolved) countdown.
    pub fn started_at(&self) -> Option<SystemTime> {
        self.started.map(|started| started.wall)
    }

    /// Wall-clock end of the running (or last resolved) countdown.
    pub fn ends_at(&self) -> Option<SystemTime> {
        self.started
            .and_then(|started| started.wall.checked_add(self.timing.duration))
    }

    /// Time left before resolution while running.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }
        let started = self.started?;
        let remaining = match started.at.checked_add(self.timing.duration) {
            Some(deadline) => deadline.saturating_duration_since(now),
            None => self
                .timing
                .duration
                .saturating_sub(now.saturating_duration_since(started.at)),
        };
        Some(remaining)
    }

    /// Terminal record of the previous countdown.
    pub fn last_outcome(&self) -> Option<&CountdownOutcome> {
        self.last_outcome.as_ref()
    }

    /// Start an automatic countdown when `tally` shows a majority and nothing is running.
    pub fn evaluate_auto_trigger(&mut self, tally: &Tally, now: Instant) -> Option<Arm> {
        if self.is_running() {
            return None;
        }
        tally.majority_target()?;
        Some(self.start(TriggerReason::Auto, now))
    }

    /// Start a manual countdown.
    pub fn start_manual(&mut self, now: Instant) -> Result<Arm, CountdownError> {
        if self.is_running() {
            return Err(CountdownError::AlreadyRunning);
        }
        Ok(self.start(TriggerReason::Manual, now))
    }

    /// Cancel the running countdown, returning the generation whose timers must be dropped.
    pub fn cancel(&mut self) -> Result<Generation, CountdownError> {
        if !self.is_running() {
            return Err(CountdownError::NotRunning);
        }
        let cancelled = self.generation;
        self.generation += 1;
        self.started = None;
        self.last_outcome = Some(CountdownOutcome::Cancelled);
        self.status = CountdownStatus::Cancelled;
        Ok(cancelled)
    }

    /// Undo a start whose timers could not be armed.
    pub fn abort_start(&mut self, generation: Generation) {
        if self.is_running() && self.generation == generation {
            self.generation += 1;
            self.started = None;
            self.status = CountdownStatus::Idle;
        }
    }

    /// Check that a callback armed for `generation` may still act.
    pub fn ensure_current(&self, generation: Generation) -> Result<(), CountdownError> {
        if generation != self.generation {
            return Err(CountdownError::Stale {
                current: self.generation,
                got: generation,
            });
        }
        if !self.is_running() {
            return Err(CountdownError::NotRunning);
        }
        Ok(())
    }

    /// Resolve the countdown armed for `generation` from the final `tally`.
    pub fn resolve(
        &mut self,
        generation: Generation,
        tally: &Tally,
    ) -> Result<Resolution, CountdownError> {
        self.ensure_current(generation)?;

        let (leaders, votes) = tally.leaders();
        let resolution = match leaders.as_slice() {
            [] => Resolution::NoElimination(NoEliminationReason::NoVotes),
            [target] => Resolution::Eliminated {
                target: *target,
                votes,
            },
            _ => Resolution::NoElimination(NoEliminationReason::Tie {
                tied: leaders,
                votes,
            }),
        };

        self.status = CountdownStatus::Resolved;
        self.last_outcome = Some(CountdownOutcome::Resolved(resolution.clone()));
        Ok(resolution)
    }

    fn start(&mut self, reason: TriggerReason, now: Instant) -> Arm {
        self.generation += 1;
        self.status = CountdownStatus::Running;
        self.started = Some(Started {
            reason,
            at: now,
            wall: SystemTime::now(),
        });
        self.last_outcome = None;

        Arm {
            generation: self.generation,
            reason,
            updates: self.timing.update_offsets(),
            resolve_after: self.timing.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        players::PlayerRegistry,
        votes::{Tally, VoteLedger},
    };

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn tally_with(players: u64, votes: &[(u64, u64)]) -> Tally {
        let mut registry = PlayerRegistry::new();
        registry.initialize((1..=players).map(PlayerId));
        let mut ledger = VoteLedger::new();
        for (voter, target) in votes {
            ledger
                .cast_vote(&registry, PlayerId(*voter), PlayerId(*target))
                .unwrap();
        }
        ledger.tally(&registry)
    }

    #[test]
    fn default_timing_broadcasts_every_four_hours_before_the_end() {
        let offsets = CountdownTiming::default().update_offsets();
        assert_eq!(
            offsets,
            vec![4 * HOUR, 8 * HOUR, 12 * HOUR, 16 * HOUR, 20 * HOUR]
        );
    }

    #[test]
    fn zero_interval_schedules_no_updates() {
        let timing = CountdownTiming {
            duration: HOUR,
            update_interval: Duration::ZERO,
        };
        assert!(timing.update_offsets().is_empty());
    }

    #[test]
    fn timing_bounds_are_checked() {
        assert_eq!(CountdownTiming::default().validate(), Ok(()));
        let timing = |duration, update_interval| CountdownTiming {
            duration,
            update_interval,
        };

        assert_eq!(
            timing(Duration::ZERO, HOUR).validate(),
            Err(TimingError::ZeroDuration)
        );
        assert_eq!(
            timing(Duration::from_secs(u64::MAX), Duration::ZERO).validate(),
            Err(TimingError::DurationTooLong(Duration::from_secs(u64::MAX)))
        );
        assert_eq!(
            timing(HOUR, Duration::from_secs(1)).validate(),
            Err(TimingError::IntervalTooShort(Duration::from_secs(1)))
        );
        assert_eq!(timing(HOUR, Duration::ZERO).validate(), Ok(()));
        assert_eq!(timing(MAX_COUNTDOWN_DURATION, MIN_UPDATE_INTERVAL).validate(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_duration_does_not_panic() {
        let mut countdown = Countdown::new(CountdownTiming {
            duration: Duration::from_secs(u64::MAX),
            update_interval: Duration::ZERO,
        });
        let arm = countdown.start_manual(Instant::now()).unwrap();
        assert!(arm.updates.is_empty());

        tokio::time::advance(HOUR).await;
        let remaining = countdown.remaining(Instant::now()).unwrap();
        assert_eq!(remaining, Duration::from_secs(u64::MAX) - HOUR);
        assert_eq!(countdown.ends_at(), None);
    }

    #[test]
    fn majority_starts_an_auto_countdown() {
        let mut countdown = Countdown::new(CountdownTiming::default());

        let four = tally_with(9, &[(1, 9), (2, 9), (3, 9), (4, 9)]);
        assert_eq!(countdown.evaluate_auto_trigger(&four, Instant::now()), None);
        assert_eq!(countdown.status(), CountdownStatus::Idle);

        let five = tally_with(9, &[(1, 9), (2, 9), (3, 9), (4, 9), (5, 9)]);
        let arm = countdown
            .evaluate_auto_trigger(&five, Instant::now())
            .expect("majority should arm the countdown");
        assert_eq!(arm.reason, TriggerReason::Auto);
        assert_eq!(arm.generation, 1);
        assert_eq!(arm.resolve_after, DEFAULT_COUNTDOWN_DURATION);
        assert_eq!(countdown.status(), CountdownStatus::Running);
    }

    #[test]
    fn auto_trigger_never_interrupts_a_running_countdown() {
        let mut countdown = Countdown::new(CountdownTiming::default());
        countdown.start_manual(Instant::now()).unwrap();

        let majority = tally_with(3, &[(1, 3), (2, 3)]);
        assert_eq!(
            countdown.evaluate_auto_trigger(&majority, Instant::now()),
            None
        );
        assert_eq!(countdown.reason(), Some(TriggerReason::Manual));
        assert_eq!(countdown.generation(), 1);
    }

    #[test]
    fn manual_start_refuses_to_restart() {
        let mut countdown = Countdown::new(CountdownTiming::default());
        countdown.start_manual(Instant::now()).unwrap();
        assert_eq!(
            countdown.start_manual(Instant::now()),
            Err(CountdownError::AlreadyRunning)
        );
    }

    #[test]
    fn cancel_invalidates_the_armed_generation() {
        let mut countdown = Countdown::new(CountdownTiming::default());
        assert_eq!(countdown.cancel(), Err(CountdownError::NotRunning));

        let arm = countdown.start_manual(Instant::now()).unwrap();
        assert_eq!(countdown.cancel(), Ok(arm.generation));
        assert_eq!(countdown.status(), CountdownStatus::Cancelled);
        assert_eq!(countdown.last_outcome(), Some(&CountdownOutcome::Cancelled));

        let tally = tally_with(3, &[(1, 2)]);
        assert_eq!(
            countdown.resolve(arm.generation, &tally),
            Err(CountdownError::Stale {
                current: arm.generation + 1,
                got: arm.generation
            })
        );
        assert_eq!(countdown.status(), CountdownStatus::Cancelled);
        assert!(countdown.start_manual(Instant::now()).is_ok());
    }

    #[test]
    fn restart_makes_older_callbacks_stale() {
        let mut countdown = Countdown::new(CountdownTiming::default());
        let first = countdown.start_manual(Instant::now()).unwrap();
        countdown.cancel().unwrap();
        let second = countdown.start_manual(Instant::now()).unwrap();

        assert!(second.generation > first.generation);
        assert!(countdown.ensure_current(first.generation).is_err());
        assert!(countdown.ensure_current(second.generation).is_ok());
    }

    #[test]
    fn resolves_unique_leader() {
        let mut countdown = Countdown::new(CountdownTiming::default());
        let arm = countdown.start_manual(Instant::now()).unwrap();
        let tally = tally_with(5, &[(1, 4), (2, 4), (3, 4), (5, 4), (4, 1)]);

        assert_eq!(
            countdown.resolve(arm.generation, &tally),
            Ok(Resolution::Eliminated {
                target: PlayerId(4),
                votes: 4
            })
        );
        assert_eq!(countdown.status(), CountdownStatus::Resolved);
        assert_eq!(
            countdown.resolve(arm.generation, &tally),
            Err(CountdownError::NotRunning)
        );
    }

    #[test]
    fn tie_and_empty_tally_eliminate_nobody() {
        let mut countdown = Countdown::new(CountdownTiming::default());
        let arm = countdown.start_manual(Instant::now()).unwrap();
        let tie = tally_with(4, &[(1, 2), (2, 1)]);
        assert_eq!(
            countdown.resolve(arm.generation, &tie),
            Ok(Resolution::NoElimination(NoEliminationReason::Tie {
                tied: vec![PlayerId(1), PlayerId(2)],
                votes: 1
            }))
        );

        let arm = countdown.start_manual(Instant::now()).unwrap();
        let empty = tally_with(4, &[]);
        assert_eq!(
            countdown.resolve(arm.generation, &empty),
            Ok(Resolution::NoElimination(NoEliminationReason::NoVotes))
        );
    }

    #[test]
    fn abort_start_returns_to_idle() {
        let mut countdown = Countdown::new(CountdownTiming::default());
        let arm = countdown.start_manual(Instant::now()).unwrap();
        countdown.abort_start(arm.generation);

        assert_eq!(countdown.status(), CountdownStatus::Idle);
        assert!(countdown.ensure_current(arm.generation).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_tracks_elapsed_time() {
        let mut countdown = Countdown::new(CountdownTiming::default());
        countdown.start_manual(Instant::now()).unwrap();

        tokio::time::advance(5 * HOUR).await;

        assert_eq!(countdown.remaining(Instant::now()), Some(19 * HOUR));
    }
}
