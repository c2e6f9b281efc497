//! Nightly archive timer.
//!
//! Fires once per day at the configured local wall-clock time and archives
//! the previous calendar day. The next fire time is recomputed from the
//! clock after every run instead of adding 24 hours, so restarts, slow runs
//! and DST shifts never accumulate drift. A failed night is logged, retried
//! up to `retry_attempts` times, and never stops the following nights.
//!
//! Wall-clock times are naive local time: on a DST transition the run can
//! land an hour early or late for that one night.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::archive::{ArchiveRun, ArchiveStore, FailedOrder};
use crate::clock::{self, Clock};
use crate::config::ArchiveConfig;
use crate::money::Money;
use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SchedulerState {
    Idle,
    Scheduled {
        #[serde(rename = "nextRun")]
        next_run: NaiveDateTime,
    },
    Firing,
    Stopped,
}

/// Result of the most recent night, kept for an operator-visible warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunOutcome {
    Complete {
        #[serde(rename = "archivedCount")]
        archived_count: u64,
        #[serde(rename = "totalRevenue")]
        total_revenue: Money,
    },
    Partial { failed: Vec<FailedOrder> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub archive_date: String,
    pub finished_at: NaiveDateTime,
    pub attempts: u32,
    pub outcome: RunOutcome,
}

#[derive(Debug)]
struct Status {
    state: SchedulerState,
    last_run: Option<LastRun>,
}

/// First `at` strictly after `now`: later today, or tomorrow once today's
/// slot has passed.
pub fn next_fire_time(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

pub struct ArchiveScheduler<S> {
    archive: Arc<ArchiveStore<S>>,
    clock: Arc<dyn Clock>,
    config: ArchiveConfig,
    cancel: CancellationToken,
    status: Arc<Mutex<Status>>,
}

impl<S: DocumentStore + 'static> ArchiveScheduler<S> {
    pub fn new(archive: Arc<ArchiveStore<S>>, clock: Arc<dyn Clock>, config: ArchiveConfig) -> Self {
        ArchiveScheduler {
            archive,
            clock,
            config,
            cancel: CancellationToken::new(),
            status: Arc::new(Mutex::new(Status {
                state: SchedulerState::Idle,
                last_run: None,
            })),
        }
    }

    /// Spawn the timer loop. Runs until [`stop`](Self::stop).
    pub fn start(&self) -> JoinHandle<()> {
        let worker = Worker {
            archive: self.archive.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
            status: self.status.clone(),
        };
        tokio::spawn(worker.run())
    }

    /// Cancel the pending sleep and end the loop. A run already in progress
    /// finishes first.
    pub fn stop(&self) {
        info!("Archive scheduler stop requested");
        self.cancel.cancel();
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.status).state.clone()
    }

    pub fn last_run(&self) -> Option<LastRun> {
        lock(&self.status).last_run.clone()
    }
}

fn lock(status: &Mutex<Status>) -> std::sync::MutexGuard<'_, Status> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker<S> {
    archive: Arc<ArchiveStore<S>>,
    clock: Arc<dyn Clock>,
    config: ArchiveConfig,
    cancel: CancellationToken,
    status: Arc<Mutex<Status>>,
}

impl<S: DocumentStore> Worker<S> {
    fn set_state(&self, state: SchedulerState) {
        lock(&self.status).state = state;
    }

    /// Sleep for `wait` unless cancelled first. Returns false on cancel.
    async fn sleep(&self, wait: std::time::Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }

    async fn run(self) {
        let at = NaiveTime::from_hms_opt(self.config.target_hour, self.config.target_minute, 0)
            .unwrap_or_default();
        info!("Archive scheduler started (daily at {})", at.format("%H:%M"));

        loop {
            let now = self.clock.now();
            let next_run = next_fire_time(now, at);
            self.set_state(SchedulerState::Scheduled { next_run });
            info!(%next_run, "Next archive run scheduled");

            let wait = (next_run - now).to_std().unwrap_or_default();
            if !self.sleep(wait).await {
                break;
            }

            self.set_state(SchedulerState::Firing);
            let date = clock::yesterday(self.clock.now());
            let last_run = self.fire(date).await;
            lock(&self.status).last_run = Some(last_run);

            if self.cancel.is_cancelled() {
                break;
            }
        }

        self.set_state(SchedulerState::Stopped);
        info!("Archive scheduler stopped");
    }

    /// Archive `date`, retrying a failed or partial run after `retry_delay`.
    async fn fire(&self, date: NaiveDate) -> LastRun {
        let archive_date = clock::format_date(date);
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            let outcome = classify(self.archive.archive_day(date).await);
            let done = matches!(outcome, RunOutcome::Complete { .. });
            if done || attempts > self.config.retry_attempts {
                break outcome;
            }
            warn!(
                %archive_date,
                attempt = attempts,
                "Archive run did not complete; retrying in {:?}",
                self.config.retry_delay
            );
            if !self.sleep(self.config.retry_delay).await {
                break outcome;
            }
        };

        match &outcome {
            RunOutcome::Complete { archived_count, total_revenue } => {
                info!(%archive_date, archived_count, %total_revenue, attempts, "Nightly archive done");
            }
            RunOutcome::Partial { failed } => {
                let ids: Vec<&str> = failed.iter().map(|f| f.order_id.as_str()).collect();
                error!(%archive_date, ?ids, "Nightly archive left orders behind; will retry next run");
            }
            RunOutcome::Failed { error } => {
                error!(%archive_date, "Nightly archive failed: {error}");
            }
        }

        LastRun {
            archive_date,
            finished_at: self.clock.now(),
            attempts,
            outcome,
        }
    }
}

fn classify(result: Result<ArchiveRun, crate::error::ArchiveError>) -> RunOutcome {
    match result {
        Ok(run) if run.is_complete() => RunOutcome::Complete {
            archived_count: run.archived_count,
            total_revenue: run.total_revenue,
        },
        Ok(run) => RunOutcome::Partial { failed: run.failed },
        Err(e) => RunOutcome::Failed {
            error: e.to_string(),
        },
    }
}
