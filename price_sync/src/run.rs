use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

/// One scheduled execution of the pipeline.
///
/// The window is the `window_days` calendar days before `run_date`:
/// `[window_start, window_end)` with `window_end` at midnight UTC of `run_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionRun {
    pub run_date: NaiveDate,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl IngestionRun {
    pub fn new(run_date: NaiveDate, window_days: u32) -> Self {
        let start_date = run_date
            .checked_sub_days(Days::new(u64::from(window_days)))
            .unwrap_or(NaiveDate::MIN);
        Self {
            run_date,
            window_start: midnight_utc(start_date),
            window_end: midnight_utc(run_date),
        }
    }
}

fn midnight_utc(d: NaiveDate) -> DateTime<Utc> {
    d.and_time(NaiveTime::MIN).and_utc()
}
