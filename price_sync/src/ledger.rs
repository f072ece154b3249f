//! Run ledger: per-run_date state, attempts and lease (SQLite).
//!
//! ## States
//! `pending -> running -> {success, failed}`, with `retrying` between attempts.
//! `success` and `failed` are settled; catchup skips settled dates.
//!
//! ## Leasing
//! [`RunLedger::claim`] is a single conditional UPSERT. It only takes the row when
//! the date is not settled (subject to [`ClaimPolicy`]) and nobody else holds an
//! unexpired lease, so two processes can never run the same date at once.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::{
    prelude::*,
    sql_query,
    sql_types::{BigInt, Text},
};
use serde::Serialize;
use thiserror::Error;

use crate::{models::RunRow, schema::ingestion_runs};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger query failed: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("corrupt ledger row for {run_date}: {message}")]
    Corrupt { run_date: String, message: String },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Retrying,
    Success,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Retrying => "retrying",
            RunState::Success => "success",
            RunState::Failed => "failed",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, RunState::Success | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => RunState::Pending,
            "running" => RunState::Running,
            "retrying" => RunState::Retrying,
            "success" => RunState::Success,
            "failed" => RunState::Failed,
            other => return Err(format!("unknown run state '{other}'")),
        })
    }
}

/// Which existing states a claim may take over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPolicy {
    /// Only dates that are not settled. Used by catchup and the cron loop.
    Unsettled,
    /// Also re-run a terminally failed date. Used by `run --date`.
    AllowFailed,
    /// Any state, including success.
    Any,
}

impl ClaimPolicy {
    fn state_filter(&self) -> &'static str {
        match self {
            ClaimPolicy::Unsettled => "ingestion_runs.state NOT IN ('success', 'failed')",
            ClaimPolicy::AllowFailed => "ingestion_runs.state <> 'success'",
            ClaimPolicy::Any => "1 = 1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_date: NaiveDate,
    pub state: RunState,
    pub attempts: u32,
    pub rows_written: u64,
    pub last_error: Option<String>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<String>,
    pub updated_at: String,
}

impl TryFrom<RunRow> for RunRecord {
    type Error = LedgerError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let corrupt = |message: String| LedgerError::Corrupt {
            run_date: row.run_date.clone(),
            message,
        };
        let run_date = NaiveDate::parse_from_str(&row.run_date, DATE_FMT)
            .map_err(|e| corrupt(format!("bad run_date: {e}")))?;
        let state = row.state.parse::<RunState>().map_err(corrupt)?;
        Ok(Self {
            run_date,
            state,
            attempts: row.attempts.max(0) as u32,
            rows_written: row.rows_written.max(0) as u64,
            last_error: row.last_error,
            lease_owner: row.lease_owner,
            lease_expires_at: row.lease_expires_at,
            updated_at: row.updated_at,
        })
    }
}

const DATE_FMT: &str = "%Y-%m-%d";

fn date_key(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
///
/// Fixed width, so lexical comparison in SQL matches time order.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Portable surface, SQLite implementation is [`SqliteRunLedger`].
pub trait RunLedger {
    /// Takes the lease for `run_date` and bumps its attempt count.
    ///
    /// Returns `None` when the date is settled (per `policy`) or leased by
    /// someone else whose lease has not expired.
    fn claim(
        &self,
        conn: &mut SqliteConnection,
        run_date: NaiveDate,
        owner: &str,
        ttl: Duration,
        policy: ClaimPolicy,
        now: DateTime<Utc>,
    ) -> LedgerResult<Option<RunRecord>>;

    /// Marks the attempt successful and releases the lease.
    ///
    /// Returns `false` when `owner` no longer holds the lease, in which case
    /// nothing is changed.
    fn complete(
        &self,
        conn: &mut SqliteConnection,
        run_date: NaiveDate,
        owner: &str,
        rows_written: u64,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool>;

    /// Records a failed attempt as `retrying` or terminal `failed` and releases the lease.
    ///
    /// Returns `false` when `owner` no longer holds the lease.
    fn record_failure(
        &self,
        conn: &mut SqliteConnection,
        run_date: NaiveDate,
        owner: &str,
        state: RunState,
        error: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool>;

    fn get(&self, conn: &mut SqliteConnection, run_date: NaiveDate) -> LedgerResult<Option<RunRecord>>;

    /// Settled dates in `[from, to]`.
    fn settled_between(
        &self,
        conn: &mut SqliteConnection,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<NaiveDate>>;

    /// Most recent records first.
    fn list(&self, conn: &mut SqliteConnection, limit: i64) -> LedgerResult<Vec<RunRecord>>;
}

/// [`RunLedger`] over the `ingestion_runs` table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteRunLedger;

impl SqliteRunLedger {
    pub fn new() -> Self {
        Self
    }
}

impl RunLedger for SqliteRunLedger {
    fn claim(
        &self,
        conn: &mut SqliteConnection,
        run_date: NaiveDate,
        owner: &str,
        ttl: Duration,
        policy: ClaimPolicy,
        now: DateTime<Utc>,
    ) -> LedgerResult<Option<RunRecord>> {
        let now_s = to_rfc3339_millis(now);
        let expires = to_rfc3339_millis(now + ttl);

        // INSERT .. ON CONFLICT DO UPDATE .. WHERE .. RETURNING (SQLite 3.35+)
        let sql = format!(
            "INSERT INTO ingestion_runs
                (run_date, state, attempts, rows_written, lease_owner, lease_expires_at, updated_at)
             VALUES (?, 'running', 1, 0, ?, ?, ?)
             ON CONFLICT (run_date) DO UPDATE SET
                state = 'running',
                attempts = ingestion_runs.attempts + 1,
                lease_owner = excluded.lease_owner,
                lease_expires_at = excluded.lease_expires_at,
                updated_at = excluded.updated_at
             WHERE {}
               AND (ingestion_runs.lease_owner IS NULL
                    OR ingestion_runs.lease_expires_at IS NULL
                    OR ingestion_runs.lease_expires_at < excluded.updated_at)
             RETURNING run_date, state, attempts, rows_written, last_error,
                       lease_owner, lease_expires_at, updated_at",
            policy.state_filter()
        );

        let rows: Vec<RunRow> = sql_query(sql)
            .bind::<Text, _>(date_key(run_date))
            .bind::<Text, _>(owner)
            .bind::<Text, _>(expires)
            .bind::<Text, _>(now_s)
            .load(conn)?;

        rows.into_iter().next().map(RunRecord::try_from).transpose()
    }

    fn complete(
        &self,
        conn: &mut SqliteConnection,
        run_date: NaiveDate,
        owner: &str,
        rows_written: u64,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        use ingestion_runs::dsl as ir;

        let updated = diesel::update(
            ir::ingestion_runs
                .filter(ir::run_date.eq(date_key(run_date)))
                .filter(ir::lease_owner.eq(owner)),
        )
        .set((
            ir::state.eq(RunState::Success.as_str()),
            ir::rows_written.eq(i64::try_from(rows_written).unwrap_or(i64::MAX)),
            ir::last_error.eq(None::<String>),
            ir::lease_owner.eq(None::<String>),
            ir::lease_expires_at.eq(None::<String>),
            ir::updated_at.eq(to_rfc3339_millis(now)),
        ))
        .execute(conn)?;
        Ok(updated == 1)
    }

    fn record_failure(
        &self,
        conn: &mut SqliteConnection,
        run_date: NaiveDate,
        owner: &str,
        state: RunState,
        error: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        use ingestion_runs::dsl as ir;

        let updated = diesel::update(
            ir::ingestion_runs
                .filter(ir::run_date.eq(date_key(run_date)))
                .filter(ir::lease_owner.eq(owner)),
        )
        .set((
            ir::state.eq(state.as_str()),
            ir::last_error.eq(Some(error)),
            ir::lease_owner.eq(None::<String>),
            ir::lease_expires_at.eq(None::<String>),
            ir::updated_at.eq(to_rfc3339_millis(now)),
        ))
        .execute(conn)?;
        Ok(updated == 1)
    }

    fn get(&self, conn: &mut SqliteConnection, run_date: NaiveDate) -> LedgerResult<Option<RunRecord>> {
        use ingestion_runs::dsl as ir;

        ir::ingestion_runs
            .find(date_key(run_date))
            .select(RunRow::as_select())
            .first(conn)
            .optional()?
            .map(RunRecord::try_from)
            .transpose()
    }

    fn settled_between(
        &self,
        conn: &mut SqliteConnection,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<NaiveDate>> {
        use ingestion_runs::dsl as ir;

        let keys: Vec<String> = ir::ingestion_runs
            .filter(ir::run_date.between(date_key(from), date_key(to)))
            .filter(ir::state.eq_any(vec![RunState::Success.as_str(), RunState::Failed.as_str()]))
            .select(ir::run_date)
            .order(ir::run_date.asc())
            .load(conn)?;

        keys.into_iter()
            .map(|k| {
                NaiveDate::parse_from_str(&k, DATE_FMT).map_err(|e| LedgerError::Corrupt {
                    run_date: k.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    fn list(&self, conn: &mut SqliteConnection, limit: i64) -> LedgerResult<Vec<RunRecord>> {
        use ingestion_runs::dsl as ir;

        ir::ingestion_runs
            .select(RunRow::as_select())
            .order(ir::run_date.desc())
            .limit(limit)
            .load(conn)?
            .into_iter()
            .map(RunRecord::try_from)
            .collect()
    }
}

/// Count of rows in `ingestion_runs` with the given state.
pub fn count_in_state(conn: &mut SqliteConnection, state: RunState) -> LedgerResult<i64> {
    #[derive(QueryableByName)]
    struct N {
        #[diesel(sql_type = BigInt)]
        n: i64,
    }
    let n: N = sql_query("SELECT COUNT(*) AS n FROM ingestion_runs WHERE state = ?")
        .bind::<Text, _>(state.as_str())
        .get_result(conn)?;
    Ok(n.n)
}
