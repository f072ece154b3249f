use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::Deserialize;

/// Which calendar days get a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[default]
    Daily,
    /// Monday through Friday.
    Weekdays,
}

impl Cadence {
    pub fn includes(&self, d: NaiveDate) -> bool {
        match self {
            Cadence::Daily => true,
            Cadence::Weekdays => !matches!(d.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }
}

/// Every run date in `[start, today]` that the cadence includes, oldest first.
pub fn due_run_dates(start: NaiveDate, today: NaiveDate, cadence: Cadence) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut d = start;
    while d <= today {
        if cadence.includes(d) {
            out.push(d);
        }
        match d.checked_add_days(Days::new(1)) {
            Some(next) => d = next,
            None => break,
        }
    }
    out
}
