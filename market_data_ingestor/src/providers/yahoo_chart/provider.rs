use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, header};
use snafu::ResultExt;

use crate::{
    models::{
        asset::AssetClass,
        bar_series::BarSeries,
        request_params::BarsRequestParams,
        timeframe::{TimeFrame, TimeFrameUnit},
    },
    providers::{
        ApiSnafu, ClientBuildSnafu, DataProvider, DecodeSnafu, ProviderError, ProviderInitError,
        ReqwestSnafu, ValidationSnafu, yahoo_chart::response::ChartResponse,
    },
};

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Clone)]
pub struct YahooChartProvider {
    client: Client,
    base_url: String,
}

impl YahooChartProvider {
    /// Builds the provider with a 10 second request timeout.
    pub fn new() -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Yahoo's `interval` query value for a timeframe, if the API supports it.
pub fn yahoo_interval(tf: &TimeFrame) -> Option<&'static str> {
    match (tf.unit, tf.amount) {
        (TimeFrameUnit::Minute, 1) => Some("1m"),
        (TimeFrameUnit::Minute, 2) => Some("2m"),
        (TimeFrameUnit::Minute, 5) => Some("5m"),
        (TimeFrameUnit::Minute, 15) => Some("15m"),
        (TimeFrameUnit::Minute, 30) => Some("30m"),
        (TimeFrameUnit::Minute, 90) => Some("90m"),
        (TimeFrameUnit::Hour, 1) => Some("60m"),
        (TimeFrameUnit::Day, 1) => Some("1d"),
        (TimeFrameUnit::Week, 1) => Some("1wk"),
        (TimeFrameUnit::Month, 1) => Some("1mo"),
        (TimeFrameUnit::Month, 3) => Some("3mo"),
        _ => None,
    }
}

/// `<base_url>/<symbol>` with the symbol percent-encoded as a single path segment.
pub fn chart_url(base_url: &str, symbol: &str) -> Result<Url, ProviderError> {
    let invalid = |reason: String| {
        ValidationSnafu {
            message: format!("bad chart base url '{base_url}': {reason}"),
        }
        .build()
    };
    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("cannot hold a path".to_string()))?
        .pop_if_empty()
        .push(symbol);
    Ok(url)
}

impl YahooChartProvider {
    async fn fetch_one(
        &self,
        symbol: &str,
        interval: &str,
        params: &BarsRequestParams,
    ) -> Result<Option<BarSeries>, ProviderError> {
        let url = chart_url(&self.base_url, symbol)?;
        let response = self
            .client
            .get(url)
            .query(&[
                ("period1", params.start.timestamp().to_string()),
                ("period2", params.end.timestamp().to_string()),
                ("interval", interval.to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        let body = response.text().await.context(ReqwestSnafu)?;

        // 404 still carries a chart.error payload; decode it for the message.
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return ApiSnafu {
                message: format!("HTTP {status} for {symbol}"),
            }
            .fail();
        }

        let parsed: ChartResponse = serde_json::from_str(&body).context(DecodeSnafu)?;
        if let Some(err) = parsed.chart.error {
            return ApiSnafu {
                message: format!("{symbol}: {}", err.description),
            }
            .fail();
        }

        let Some(result) = parsed.chart.result.and_then(|mut r| r.pop()) else {
            return Ok(None);
        };
        // Yahoo pads the range to whole sessions; keep the requested half-open window.
        let bars: Vec<_> = result
            .into_bars()
            .into_iter()
            .filter(|b| b.timestamp >= params.start && b.timestamp < params.end)
            .collect();

        Ok(Some(BarSeries {
            symbol: symbol.to_string(),
            timeframe: params.timeframe,
            bars,
        }))
    }
}

#[async_trait]
impl DataProvider for YahooChartProvider {
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<Vec<BarSeries>, ProviderError> {
        let Some(interval) = yahoo_interval(&params.timeframe) else {
            return ValidationSnafu {
                message: format!("yahoo has no interval for timeframe {}", params.timeframe),
            }
            .fail();
        };
        if params.asset_class != AssetClass::UsEquity {
            return ValidationSnafu {
                message: format!("asset class {:?} is not supported", params.asset_class),
            }
            .fail();
        }

        let mut out = Vec::with_capacity(params.symbols.len());
        for symbol in &params.symbols {
            if let Some(series) = self.fetch_one(symbol, interval, &params).await? {
                out.push(series);
            }
        }
        Ok(out)
    }
}
