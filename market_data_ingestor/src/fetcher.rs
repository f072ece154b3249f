//! Per-symbol bar retrieval on top of a [`DataProvider`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use snafu::{ResultExt, Snafu};

use crate::{
    models::{
        asset::AssetClass,
        bar::Bar,
        request_params::{BarsRequestParams, ProviderParams},
        symbol::Symbol,
        timeframe::TimeFrame,
    },
    providers::{DataProvider, ProviderError},
};

/// A single symbol could not be fetched. Callers treat this as recoverable.
#[derive(Debug, Snafu)]
#[snafu(display("fetch failed for {symbol}: {source}"))]
pub struct FetchFailed {
    pub symbol: Symbol,
    pub source: ProviderError,
}

#[derive(Clone)]
pub struct MarketDataFetcher {
    provider: Arc<dyn DataProvider>,
    provider_specific: ProviderParams,
}

impl MarketDataFetcher {
    pub fn new(provider: Arc<dyn DataProvider>) -> Self {
        Self {
            provider,
            provider_specific: ProviderParams::None,
        }
    }

    /// Options attached to every request, e.g. the Alpaca feed.
    pub fn with_provider_params(mut self, params: ProviderParams) -> Self {
        self.provider_specific = params;
        self
    }

    /// Fetches bars for `symbol` in `[start, end)`, ascending by timestamp.
    ///
    /// A symbol with no data in the window yields an empty vector, not an error.
    pub async fn fetch_bars(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: TimeFrame,
    ) -> Result<Vec<Bar>, FetchFailed> {
        let params = BarsRequestParams {
            symbols: vec![symbol.to_string()],
            timeframe: interval,
            start,
            end,
            asset_class: AssetClass::UsEquity,
            provider_specific: self.provider_specific.clone(),
        };

        let series = self
            .provider
            .fetch_bars(params)
            .await
            .context(FetchFailedSnafu {
                symbol: symbol.clone(),
            })?;

        let bars = series
            .into_iter()
            .find(|s| s.symbol == symbol.as_str())
            .map(|s| s.bars)
            .unwrap_or_default();
        tracing::debug!(%symbol, bars = bars.len(), "bars fetched");
        Ok(bars)
    }
}
