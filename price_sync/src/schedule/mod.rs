//! Run policy: which dates run, in what order, and how failures are retried.
//!
//! [`Scheduler`] drives a [`Pipeline`] one run_date at a time. Every attempt is
//! recorded in the run ledger, which is also where missed dates come from when
//! catching up. Two guards keep a date from running twice at once: an
//! in-process claim set and the ledger lease.

mod cadence;
pub mod cron;
mod retry;

pub use cadence::{Cadence, due_run_dates};
pub use retry::RetryPolicy;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use chrono::{NaiveDate, Utc};
use diesel::SqliteConnection;
use shared_utils::env::get_env_var;
use thiserror::Error;

use crate::{
    db::{DbError, connection::connect_sqlite},
    ledger::{ClaimPolicy, LedgerError, LedgerResult, RunLedger, RunRecord, RunState, SqliteRunLedger},
    pipeline::{CancelFlag, Pipeline, PipelineError, RunSummary},
};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("ledger task panicked or was aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("cron scheduler error: {0}")]
    Cron(String),
    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// Scheduling knobs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct RunPolicy {
    pub retry: RetryPolicy,
    pub cadence: Cadence,
    pub catchup: bool,
    pub start_date: NaiveDate,
    /// How long a claimed date stays leased to this process.
    pub lease_ttl: chrono::Duration,
}

impl RunPolicy {
    pub fn new(start_date: NaiveDate) -> Self {
        Self {
            retry: RetryPolicy::default(),
            cadence: Cadence::default(),
            catchup: true,
            start_date,
            lease_ttl: chrono::Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another task in this process is running the date.
    InFlight,
    /// The ledger refused the lease: settled, or leased elsewhere.
    NotClaimed,
    /// The lease expired mid-run and another owner took the date; its
    /// result is the one recorded.
    LeaseLost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded { summary: RunSummary, attempts: u32 },
    Failed { attempts: u32, error: String },
    Cancelled,
    Skipped(SkipReason),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded { .. })
    }
}

/// Removes the date from the in-process claim set on drop.
struct LocalClaim {
    set: Arc<Mutex<HashSet<NaiveDate>>>,
    date: NaiveDate,
}

impl Drop for LocalClaim {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.date);
    }
}

pub struct Scheduler {
    pipeline: Arc<dyn Pipeline>,
    database_url: String,
    policy: RunPolicy,
    owner: String,
    ledger: SqliteRunLedger,
    in_flight: Arc<Mutex<HashSet<NaiveDate>>>,
    cancel: CancelFlag,
}

impl Scheduler {
    pub fn new(pipeline: Arc<dyn Pipeline>, database_url: impl Into<String>, policy: RunPolicy) -> Self {
        let host = get_env_var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
        Self {
            pipeline,
            database_url: database_url.into(),
            policy,
            owner: format!("{host}-{}", std::process::id()),
            ledger: SqliteRunLedger::new(),
            in_flight: Arc::default(),
            cancel: CancelFlag::default(),
        }
    }

    /// Overrides the lease owner id (defaults to `<HOSTNAME>-<pid>`).
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Shares a cancel flag; once set, no further dates are started.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn with_ledger<T, F>(&self, f: F) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteRunLedger, &mut SqliteConnection) -> LedgerResult<T> + Send + 'static,
    {
        let url = self.database_url.clone();
        let ledger = self.ledger;
        tokio::task::spawn_blocking(move || -> Result<T, SchedulerError> {
            let mut conn = connect_sqlite(&url)?;
            Ok(f(&ledger, &mut conn)?)
        })
        .await?
    }

    fn claim_local(&self, date: NaiveDate) -> Option<LocalClaim> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(date).then(|| LocalClaim {
            set: Arc::clone(&self.in_flight),
            date,
        })
    }

    /// Dates that still need a run as of `today`, oldest first.
    ///
    /// With catchup disabled only the latest due date is considered.
    pub async fn pending_dates(&self, today: NaiveDate) -> Result<Vec<NaiveDate>, SchedulerError> {
        let due = due_run_dates(self.policy.start_date, today, self.policy.cadence);
        let Some(&latest) = due.last() else {
            return Ok(Vec::new());
        };

        let from = self.policy.start_date;
        let settled: HashSet<NaiveDate> = self
            .with_ledger(move |l, c| l.settled_between(c, from, today))
            .await?
            .into_iter()
            .collect();

        let candidates = if self.policy.catchup { due } else { vec![latest] };
        Ok(candidates.into_iter().filter(|d| !settled.contains(d)).collect())
    }

    /// Runs `run_date` under `retry`, recording every attempt in the ledger.
    #[tracing::instrument(skip(self, retry, claim), fields(owner = %self.owner))]
    pub async fn run_date(
        &self,
        run_date: NaiveDate,
        retry: RetryPolicy,
        claim: ClaimPolicy,
    ) -> Result<RunOutcome, SchedulerError> {
        let Some(_local) = self.claim_local(run_date) else {
            tracing::warn!("run already in flight in this process; skipped");
            return Ok(RunOutcome::Skipped(SkipReason::InFlight));
        };

        let max_attempts = retry.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;

            let owner = self.owner.clone();
            let ttl = self.policy.lease_ttl;
            let claimed = self
                .with_ledger(move |l, c| l.claim(c, run_date, &owner, ttl, claim, Utc::now()))
                .await?;
            let Some(record) = claimed else {
                tracing::warn!("ledger refused the lease; skipped");
                return Ok(RunOutcome::Skipped(SkipReason::NotClaimed));
            };

            tracing::info!(attempt, max_attempts, "run attempt started");
            let result = self.pipeline.execute(run_date).await;

            let owner = self.owner.clone();
            match result {
                Ok(summary) => {
                    let rows = summary.rows_written as u64;
                    let recorded = self
                        .with_ledger(move |l, c| l.complete(c, run_date, &owner, rows, Utc::now()))
                        .await?;
                    if !recorded {
                        tracing::warn!(rows, "lease lost before completion; outcome not recorded");
                        return Ok(RunOutcome::Skipped(SkipReason::LeaseLost));
                    }
                    tracing::info!(attempts = record.attempts, rows, "run succeeded");
                    return Ok(RunOutcome::Succeeded {
                        summary,
                        attempts: record.attempts,
                    });
                }
                Err(PipelineError::Cancelled) => {
                    let recorded = self
                        .with_ledger(move |l, c| {
                            l.record_failure(c, run_date, &owner, RunState::Retrying, "cancelled", Utc::now())
                        })
                        .await?;
                    if !recorded {
                        tracing::warn!("lease lost before cancellation was recorded");
                    }
                    return Ok(RunOutcome::Cancelled);
                }
                Err(e) => {
                    let message = e.to_string();
                    let terminal = attempt >= max_attempts;
                    let state = if terminal { RunState::Failed } else { RunState::Retrying };
                    let msg = message.clone();
                    let recorded = self
                        .with_ledger(move |l, c| {
                            l.record_failure(c, run_date, &owner, state, &msg, Utc::now())
                        })
                        .await?;
                    if !recorded {
                        tracing::warn!(error = %message, "lease lost before failure was recorded; not retrying");
                        return Ok(RunOutcome::Skipped(SkipReason::LeaseLost));
                    }

                    if terminal {
                        tracing::error!(attempts = record.attempts, error = %message, "run failed");
                        return Ok(RunOutcome::Failed {
                            attempts: record.attempts,
                            error: message,
                        });
                    }
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_secs = retry.delay.as_secs(),
                        error = %message,
                        "run attempt failed; retry scheduled"
                    );
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }

    /// One attempt for one date, as used by an external scheduling host that
    /// owns retries. A terminally failed date may be re-run; a successful one
    /// only with `force`.
    pub async fn run_once(&self, run_date: NaiveDate, force: bool) -> Result<RunOutcome, SchedulerError> {
        let claim = if force { ClaimPolicy::Any } else { ClaimPolicy::AllowFailed };
        self.run_date(run_date, RetryPolicy::once(), claim).await
    }

    /// Runs every pending date in order, each under the configured retry policy.
    pub async fn catchup(&self, today: NaiveDate) -> Result<Vec<(NaiveDate, RunOutcome)>, SchedulerError> {
        let pending = self.pending_dates(today).await?;
        tracing::info!(count = pending.len(), %today, "catchup pass started");

        let mut results = Vec::with_capacity(pending.len());
        for date in pending {
            if self.cancel.is_cancelled() {
                tracing::warn!(%date, "cancellation requested; catchup stopped");
                break;
            }
            let outcome = self
                .run_date(date, self.policy.retry, ClaimPolicy::Unsettled)
                .await?;
            let cancelled = outcome == RunOutcome::Cancelled;
            results.push((date, outcome));
            if cancelled {
                break;
            }
        }
        Ok(results)
    }

    pub async fn get(&self, run_date: NaiveDate) -> Result<Option<RunRecord>, SchedulerError> {
        self.with_ledger(move |l, c| l.get(c, run_date)).await
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<RunRecord>, SchedulerError> {
        self.with_ledger(move |l, c| l.list(c, limit)).await
    }
}
