use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use reqwest::Client;

use crate::{
    models::symbol::Symbol,
    universe::{DirectoryError, SymbolDirectory},
};

/// S&P 500 constituents, maintained as a flat CSV.
pub const DEFAULT_LISTING_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";
pub const DEFAULT_COLUMN: &str = "Symbol";

/// Downloads a CSV listing and reads tickers from one named column.
#[derive(Debug, Clone)]
pub struct CsvListingDirectory {
    client: Client,
    url: String,
    column: String,
}

impl CsvListingDirectory {
    pub fn new(url: impl Into<String>, column: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            url: url.into(),
            column: column.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Extracts the symbols in `column` from a CSV document.
///
/// Entries that fail [`Symbol`] validation and repeats are skipped with a
/// warning. A missing column or malformed CSV is reported as
/// [`DirectoryError::Unavailable`].
pub fn parse_listing(body: &str, column: &str) -> Result<Vec<Symbol>, DirectoryError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| DirectoryError::Unavailable(format!("failed to read CSV headers: {e}")))?;
    let idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(column))
        .ok_or_else(|| DirectoryError::Unavailable(format!("column '{column}' not found")))?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| DirectoryError::Unavailable(format!("malformed CSV record: {e}")))?;
        let Some(raw) = record.get(idx) else {
            tracing::warn!(line = line + 2, "listing row has no '{column}' field; skipped");
            continue;
        };
        match Symbol::new(raw) {
            Ok(symbol) => {
                if seen.insert(symbol.clone()) {
                    out.push(symbol);
                } else {
                    tracing::warn!(%symbol, "duplicate symbol in listing; skipped");
                }
            }
            Err(e) => tracing::warn!(line = line + 2, error = %e, "invalid symbol in listing; skipped"),
        }
    }
    Ok(out)
}

#[async_trait]
impl SymbolDirectory for CsvListingDirectory {
    async fn list_symbols(&self) -> Result<Vec<Symbol>, DirectoryError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let symbols = parse_listing(&body, &self.column)?;
        tracing::info!(url = %self.url, count = symbols.len(), "symbol listing loaded");
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../tests/fixtures/constituents.csv");

    fn names(v: Vec<Symbol>) -> Vec<String> {
        v.into_iter().map(String::from).collect()
    }

    #[test]
    fn reads_named_column_in_order() {
        let got = names(parse_listing(FIXTURE, DEFAULT_COLUMN).unwrap());
        assert_eq!(got, ["MMM", "AOS", "ABT", "BRK.B", "BF.B"]);
    }

    #[test]
    fn skips_blank_and_duplicate_rows() {
        let body = "Symbol,Security\nAAPL,Apple\n,Nothing\nAAPL,Apple again\nMSFT,Microsoft\n";
        assert_eq!(names(parse_listing(body, "Symbol").unwrap()), ["AAPL", "MSFT"]);
    }

    #[test]
    fn missing_column_is_unavailable() {
        let err = parse_listing("Ticker,Name\nAAPL,Apple\n", "Symbol").unwrap_err();
        assert!(matches!(err, DirectoryError::Unavailable(_)));
    }

    #[test]
    fn header_only_yields_empty() {
        assert!(parse_listing("Symbol,Security\n", "Symbol").unwrap().is_empty());
    }
}
