//! Arms countdown timers and runs their callbacks against the session they belong to.
//!
//! Every callback re-checks its generation under the session lock, so timers
//! that survive a cancellation or a restart do nothing when they fire.

use std::sync::Arc;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    dto::{
        format_remaining, format_system_time,
        game::{OutcomeDto, TallySummary},
        sse::Notice,
    },
    gateway::NotificationSink,
    scheduler::{Scheduler, SchedulerError, TimerKey},
    state::{
        ScopeId, SessionHandle, SharedState,
        countdown::{Arm, Generation},
        session::GameSession,
    },
};

/// Schedule the periodic broadcasts and the resolution described by `arm`.
///
/// On failure every timer already armed for this generation is dropped; the
/// caller still holds the session lock and must undo the start.
pub fn arm_timers(
    state: &SharedState,
    handle: &SessionHandle,
    session: &GameSession,
    arm: &Arm,
) -> Result<(), SchedulerError> {
    let key = TimerKey {
        session: session.id(),
        generation: arm.generation,
    };
    let scope = session.scope().clone();
    let scheduler = state.scheduler().clone();
    let notifier = state.notifier().clone();

    let armed = arm
        .updates
        .iter()
        .try_for_each(|offset| {
            scheduler.after(
                key,
                *offset,
                on_update(handle.clone(), notifier.clone(), scope.clone(), key).boxed(),
            )
        })
        .and_then(|()| {
            scheduler.after(
                key,
                arm.resolve_after,
                on_resolve(
                    handle.clone(),
                    notifier.clone(),
                    scheduler.clone(),
                    scope.clone(),
                    key,
                )
                .boxed(),
            )
        });

    match armed {
        Ok(()) => {
            info!(
                %scope,
                generation = arm.generation,
                reason = ?arm.reason,
                updates = arm.updates.len(),
                "countdown armed"
            );
            Ok(())
        }
        Err(err) => {
            warn!(%scope, generation = arm.generation, error = %err, "failed to arm countdown");
            scheduler.cancel_all(key);
            Err(err)
        }
    }
}

/// Drop the timers of a cancelled generation.
pub fn disarm(state: &SharedState, session: &GameSession, generation: Generation) {
    state.scheduler().cancel_all(TimerKey {
        session: session.id(),
        generation,
    });
    info!(scope = %session.scope(), generation, "countdown cancelled");
}

/// Notice announcing a countdown that has just been armed.
pub fn started_notice(session: &GameSession, arm: &Arm, now: Instant) -> Notice {
    let countdown = session.countdown();
    Notice::CountdownStarted {
        generation: arm.generation,
        reason: arm.reason,
        ends_at: countdown.ends_at().map(format_system_time),
        remaining: format_remaining(countdown.remaining(now).unwrap_or(arm.resolve_after)),
        tally: TallySummary::from(&session.tally()),
    }
}

async fn on_update(
    handle: SessionHandle,
    notifier: Arc<dyn NotificationSink>,
    scope: ScopeId,
    key: TimerKey,
) {
    let session = handle.read().await;
    match session.tick(key.generation, Instant::now()) {
        Ok(report) => {
            info!(
                %scope,
                generation = report.generation,
                remaining_secs = report.remaining.as_secs(),
                "countdown update"
            );
            notifier.broadcast(
                &scope,
                Notice::CountdownUpdate {
                    generation: report.generation,
                    remaining_secs: report.remaining.as_secs(),
                    remaining: format_remaining(report.remaining),
                    tally: TallySummary::from(&report.tally),
                },
            );
        }
        Err(err) => {
            debug!(%scope, generation = key.generation, reason = %err, "ignoring stale countdown update")
        }
    }
}

async fn on_resolve(
    handle: SessionHandle,
    notifier: Arc<dyn NotificationSink>,
    scheduler: Arc<dyn Scheduler>,
    scope: ScopeId,
    key: TimerKey,
) {
    let mut session = handle.write().await;
    match session.resolve(key.generation) {
        Ok(report) => {
            let outcome = OutcomeDto::from(&report.resolution);
            info!(%scope, generation = report.generation, outcome = ?outcome, "countdown resolved");
            notifier.broadcast(
                &scope,
                Notice::HammerResolved {
                    generation: report.generation,
                    outcome,
                    final_tally: TallySummary::from(&report.final_tally),
                    tally: TallySummary::from(&report.tally_after),
                },
            );
            scheduler.release(key);
        }
        Err(err) => {
            debug!(%scope, generation = key.generation, reason = %err, "ignoring stale countdown resolution")
        }
    }
}
