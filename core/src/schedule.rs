//! Accrual periods and the background trigger that walks them.
//!
//! Periods are fixed-length windows anchored to a UTC wall-clock time,
//! counted from the Unix epoch. With the default 24h / 00:00 schedule a
//! period is one UTC calendar day.

use crate::{
    clock::LedgerClock,
    config::AccrualConfig,
    error::{LedgerError, LedgerResult},
    types::Timestamp,
};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualSchedule {
    interval: Duration,
    origin: Timestamp,
}

impl AccrualSchedule {
    pub fn new(interval: Duration, anchor: NaiveTime) -> LedgerResult<Self> {
        if interval <= Duration::zero() {
            return Err(LedgerError::validation("accrual interval must be positive"));
        }
        let origin = DateTime::<Utc>::UNIX_EPOCH
            .date_naive()
            .and_time(anchor)
            .and_utc();
        Ok(Self { interval, origin })
    }

    pub fn from_config(config: &AccrualConfig) -> LedgerResult<Self> {
        Self::new(config.interval(), config.anchor()?)
    }

    /// Canonical schedule: once a day at 00:00 UTC.
    pub fn daily() -> Self {
        Self {
            interval: Duration::hours(24),
            origin: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start of the period containing `now`.
    pub fn period_start(&self, now: Timestamp) -> Timestamp {
        let step = self.interval.num_milliseconds();
        let elapsed = (now - self.origin).num_milliseconds();
        self.origin + Duration::milliseconds(elapsed.div_euclid(step) * step)
    }

    /// Start of the period after the one containing `now`.
    pub fn next_run_after(&self, now: Timestamp) -> Timestamp {
        self.period_start(now) + self.interval
    }
}

/// Background thread firing `job` at every period boundary.
pub struct AccrualScheduler {
    stop: Sender<()>,
    worker: JoinHandle<()>,
}

impl AccrualScheduler {
    /// Start the trigger. `job` runs once immediately, to catch up on a
    /// period missed while the process was down, and then at each boundary.
    /// `job` must tolerate being re-run within a period.
    pub fn spawn<F>(
        schedule: AccrualSchedule,
        clock: Arc<dyn LedgerClock>,
        mut job: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(Timestamp) + Send + 'static,
    {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let worker = thread::Builder::new()
            .name("accrual-scheduler".into())
            .spawn(move || {
                job(clock.now());
                loop {
                    let now = clock.now();
                    let next = schedule.next_run_after(now);
                    let wait = (next - now).to_std().unwrap_or_default();
                    log::debug!("next accrual cycle at {next}");
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => job(clock.now()),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::info!("accrual scheduler stopped");
            })?;
        Ok(Self { stop, worker })
    }

    /// Stop the trigger and wait for an in-flight cycle to finish.
    pub fn stop(self) {
        let _ = self.stop.send(());
        if self.worker.join().is_err() {
            log::error!("accrual scheduler thread panicked");
        }
    }
}
