//! Periodic expiry and auto-rotation of access codes.
//!
//! Two independent ticks:
//!
//! - **expire** deletes every code with `expires_at <= now`
//! - **rotate** rotates every code with `now < expires_at <= now + window`
//!
//! [`Sweeper::spawn`] drives both on tokio intervals until the shutdown signal
//! flips. A failing tick logs at `error` and the next tick tries again.
//! Scheduling assumes a single running instance.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::config::SweeperConfig;
use crate::error::Result;
use crate::rotator::Rotator;
use crate::storage::{CodeStore, ReplaceOutcome};

/// How often each tick runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSchedule {
    /// Period of the expire tick.
    pub expire_interval: StdDuration,
    /// Period of the rotate tick.
    pub rotate_interval: StdDuration,
}

impl From<&SweeperConfig> for SweepSchedule {
    fn from(config: &SweeperConfig) -> Self {
        Self {
            expire_interval: StdDuration::from_secs(config.expire_interval_secs),
            rotate_interval: StdDuration::from_secs(config.rotate_interval_secs),
        }
    }
}

/// Outcome of one rotate tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotateReport {
    /// Codes that received a fresh value.
    pub rotated: usize,
    /// Codes that could not be rotated this tick.
    pub failed: usize,
}

/// Background maintenance of the code store.
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn CodeStore>,
    rotator: Rotator,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl Sweeper {
    /// Create a sweeper that pre-emptively rotates codes expiring within `window`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CodeStore>,
        rotator: Rotator,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Self {
        Self {
            store,
            rotator,
            clock,
            window,
        }
    }

    /// Delete every expired code.
    ///
    /// # Errors
    ///
    /// Returns a storage error; nothing is deleted in that case.
    pub fn expire_tick(&self) -> Result<usize> {
        let now = self.clock.now();
        let expired = self.store.delete_expired(now)?;
        if expired > 0 {
            tracing::info!(expired, "Expired access codes");
        } else {
            tracing::debug!("No access codes to expire");
        }
        Ok(expired)
    }

    /// Rotate every code inside the expiry window.
    ///
    /// All candidates are rotated in one store write. A code whose fresh value
    /// collided is retried on its own; a failure there is counted and logged.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the candidates cannot be listed or the batch
    /// cannot be written.
    pub fn rotate_tick(&self) -> Result<RotateReport> {
        let now = self.clock.now();
        let candidates = self.store.codes_expiring_between(now, now + self.window)?;
        let outcomes = self.rotator.rotate_batch(&candidates)?;

        let mut report = RotateReport::default();
        for (code, outcome) in candidates.iter().zip(outcomes) {
            match outcome {
                ReplaceOutcome::Replaced(_) => report.rotated += 1,
                ReplaceOutcome::Missing => {}
                ReplaceOutcome::Collision => match self.rotator.rotate(code) {
                    Ok(Some(_)) => report.rotated += 1,
                    Ok(None) => {}
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!(code_id = %code.id, error = %e, "Failed to auto-rotate access code");
                    }
                },
            }
        }

        if report.rotated > 0 || report.failed > 0 {
            tracing::info!(
                rotated = report.rotated,
                failed = report.failed,
                "Auto-rotated access codes"
            );
        }
        Ok(report)
    }

    /// Run both ticks on their own intervals until `shutdown` becomes `true`.
    pub fn spawn(
        self: Arc<Self>,
        schedule: SweepSchedule,
        shutdown: watch::Receiver<bool>,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let expire = {
            let sweeper = Arc::clone(&self);
            run_every(schedule.expire_interval, shutdown.clone(), move || {
                if let Err(e) = sweeper.expire_tick() {
                    tracing::error!(error = %e, "Expire tick failed");
                }
            })
        };
        let rotate = run_every(schedule.rotate_interval, shutdown, move || {
            if let Err(e) = self.rotate_tick() {
                tracing::error!(error = %e, "Rotate tick failed");
            }
        });
        (expire, rotate)
    }
}

fn run_every<F>(period: StdDuration, mut shutdown: watch::Receiver<bool>, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so startup is quiet.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Sweeper task stopping");
                        break;
                    }
                }
            }
        }
    })
}
