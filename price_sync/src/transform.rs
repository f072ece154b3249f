//! Raw bars to [`NormalizedRow`]s.

use market_data_ingestor::models::{bar::Bar, symbol::Symbol};

use crate::models::NormalizedRow;

/// Normalizes one symbol's bars for a single window.
///
/// Rows come out in ascending timestamp order; bars sharing a timestamp keep the
/// provider's order. Change fields are computed against the previous row in
/// this window only, so the first row always has a change of zero.
pub fn normalize(raw: &[Bar], symbol: &Symbol) -> Vec<NormalizedRow> {
    let mut bars: Vec<&Bar> = raw.iter().collect();
    bars.sort_by_key(|b| b.timestamp);

    let mut out = Vec::with_capacity(bars.len());
    let mut prev_close: Option<f64> = None;
    for bar in bars {
        let (close_change, close_pct_change) = match prev_close {
            None => (0.0, Some(0.0)),
            Some(prev) => {
                let change = bar.close - prev;
                let pct = (prev != 0.0).then(|| change * 100.0 / prev);
                (change, pct)
            }
        };
        out.push(NormalizedRow {
            trade_date: bar.timestamp.date_naive(),
            open_price: bar.open,
            high_price: bar.high,
            low_price: bar.low,
            close_price: bar.close,
            volume: bar.volume.round() as i64,
            symbol: symbol.to_string(),
            close_change,
            close_pct_change,
        });
        prev_close = Some(bar.close);
    }
    out
}
