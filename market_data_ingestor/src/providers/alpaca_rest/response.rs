use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::models::bar::Bar;

#[derive(Deserialize, Debug)]
pub struct AlpacaBar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
}

impl From<AlpacaBar> for Bar {
    fn from(ab: AlpacaBar) -> Self {
        Bar::ohlcv(ab.timestamp, ab.open, ab.high, ab.low, ab.close, ab.volume)
    }
}

/// One page of `/v2/stocks/bars`.
///
/// Alpaca sends `"bars": null` when nothing matched, hence the `Option`.
#[derive(Deserialize, Debug)]
pub struct AlpacaResponse {
    pub bars: Option<IndexMap<String, Vec<AlpacaBar>>>,
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_page_with_token() {
        let body = r#"{
            "bars": {
                "AAPL": [
                    {"t":"2025-04-28T04:00:00Z","o":209.9,"h":211.5,"l":207.5,"c":210.1,"v":38743074,"n":512345,"vw":209.8}
                ]
            },
            "next_page_token": "QUFQTHxEfDIwMjU="
        }"#;
        let page: AlpacaResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("QUFQTHxEfDIwMjU="));
        let bars = page.bars.unwrap();
        let bar = bars
            .into_iter()
            .flat_map(|(_, v)| v)
            .map(Bar::from)
            .next()
            .unwrap();
        assert_eq!(bar.close, 210.1);
        assert_eq!(bar.volume, 38743074.0);
    }

    #[test]
    fn decodes_empty_page() {
        let page: AlpacaResponse =
            serde_json::from_str(r#"{"bars": null, "next_page_token": null}"#).unwrap();
        assert!(page.bars.is_none());
        assert!(page.next_page_token.is_none());
    }
}
