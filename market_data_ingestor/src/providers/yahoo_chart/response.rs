use chrono::{TimeZone, Utc};
use serde::Deserialize;

use crate::models::bar::Bar;

/// Top level of `/v8/finance/chart/{symbol}`.
#[derive(Deserialize, Debug)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Deserialize, Debug)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
pub struct ChartError {
    pub code: Option<String>,
    pub description: String,
}

#[derive(Deserialize, Debug)]
pub struct ChartResult {
    /// Absent when the range holds no trading sessions.
    pub timestamp: Option<Vec<i64>>,
    pub indicators: Indicators,
}

#[derive(Deserialize, Debug)]
pub struct Indicators {
    pub quote: Vec<Quote>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Quote {
    pub open: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
    pub close: Vec<Option<f64>>,
    pub volume: Vec<Option<f64>>,
}

impl ChartResult {
    /// Zips the column arrays into bars, skipping any row with a null field.
    pub fn into_bars(self) -> Vec<Bar> {
        let Some(timestamps) = self.timestamp else {
            return Vec::new();
        };
        let Some(q) = self.indicators.quote.into_iter().next() else {
            return Vec::new();
        };

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.into_iter().enumerate() {
            let at = |col: &Vec<Option<f64>>| col.get(i).copied().flatten();
            let (Some(o), Some(h), Some(l), Some(c), Some(v)) =
                (at(&q.open), at(&q.high), at(&q.low), at(&q.close), at(&q.volume))
            else {
                continue;
            };
            if !(o.is_finite() && h.is_finite() && l.is_finite() && c.is_finite() && v.is_finite()) {
                continue;
            }
            let Some(timestamp) = Utc.timestamp_opt(ts, 0).single() else {
                continue;
            };
            bars.push(Bar::ohlcv(timestamp, o, h, l, c, v));
        }
        bars.sort_by_key(|b| b.timestamp);
        bars
    }
}
