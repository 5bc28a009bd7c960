//! Delayed-callback primitive used by the countdown.
//!
//! Timers are grouped by [`TimerKey`] so everything armed for one countdown
//! generation can be dropped at once when that generation is cancelled.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::{runtime::Handle, task::JoinHandle, time::sleep};
use tracing::debug;
use uuid::Uuid;

use crate::state::countdown::Generation;

/// Groups the timers of one countdown generation of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Session owning the timers.
    pub session: Uuid,
    /// Countdown generation the timers were armed for.
    pub generation: Generation,
}

/// Failure to arm a timer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// No Tokio runtime is available on the calling thread.
    #[error("no async runtime available to drive timers")]
    NoRuntime,
    /// The scheduler has been shut down.
    #[error("scheduler is shut down")]
    ShutDown,
}

/// Fire-and-forget delayed callbacks with grouped cancellation.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed, unless `key` is cancelled first.
    fn after(
        &self,
        key: TimerKey,
        delay: Duration,
        task: BoxFuture<'static, ()>,
    ) -> Result<(), SchedulerError>;

    /// Abort every pending timer registered under `key`.
    fn cancel_all(&self, key: TimerKey);

    /// Forget the timers registered under `key` without aborting them.
    fn release(&self, key: TimerKey);

    /// Abort everything and refuse new timers.
    fn shutdown(&self);
}

/// [`Scheduler`] backed by spawned Tokio tasks.
#[derive(Default)]
pub struct TokioScheduler {
    timers: DashMap<TimerKey, Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TokioScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers still tracked under `key`.
    pub fn pending(&self, key: TimerKey) -> usize {
        self.timers.get(&key).map_or(0, |handles| {
            handles.iter().filter(|handle| !handle.is_finished()).count()
        })
    }
}

impl Scheduler for TokioScheduler {
    fn after(
        &self,
        key: TimerKey,
        delay: Duration,
        task: BoxFuture<'static, ()>,
    ) -> Result<(), SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let handle = runtime.spawn(async move {
            sleep(delay).await;
            task.await;
        });

        let mut handles = self.timers.entry(key).or_default();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
        Ok(())
    }

    fn cancel_all(&self, key: TimerKey) {
        if let Some((_, handles)) = self.timers.remove(&key) {
            debug!(
                session = %key.session,
                generation = key.generation,
                count = handles.len(),
                "aborting countdown timers"
            );
            for handle in handles {
                handle.abort();
            }
        }
    }

    fn release(&self, key: TimerKey) {
        self.timers.remove(&key);
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let keys: Vec<TimerKey> = self.timers.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            self.cancel_all(key);
        }
    }
}
