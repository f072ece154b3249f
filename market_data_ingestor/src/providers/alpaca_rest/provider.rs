use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::get_env_var;
use snafu::ResultExt;

use crate::{
    models::{bar::Bar, bar_series::BarSeries, request_params::BarsRequestParams},
    providers::{
        ApiSnafu, ClientBuildSnafu, DataProvider, DecodeSnafu, InvalidApiKeySnafu,
        MissingEnvVarSnafu, ProviderError, ProviderInitError, ReqwestSnafu,
        alpaca_rest::{
            params::{construct_params, validate_request},
            response::{AlpacaBar, AlpacaResponse},
        },
    },
};

const BASE_URL: &str = "https://data.alpaca.markets/v2/stocks/bars";

pub struct AlpacaProvider {
    client: Client,
    base_url: String,
    _api_key: SecretString,
    _secret_key: SecretString,
}

impl AlpacaProvider {
    /// Creates a new Alpaca provider.
    ///
    /// Reads API keys from the `APCA_API_KEY_ID` and `APCA_API_SECRET_KEY`
    /// environment variables.
    pub fn new() -> Result<Self, ProviderInitError> {
        let api_key = SecretString::new(
            get_env_var("APCA_API_KEY_ID")
                .context(MissingEnvVarSnafu)?
                .into(),
        );
        let secret_key = SecretString::new(
            get_env_var("APCA_API_SECRET_KEY")
                .context(MissingEnvVarSnafu)?
                .into(),
        );
        Self::with_credentials(api_key, secret_key)
    }

    /// Creates a provider from already-loaded credentials.
    pub fn with_credentials(
        api_key: SecretString,
        secret_key: SecretString,
    ) -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "APCA-API-KEY-ID",
            header::HeaderValue::from_str(api_key.expose_secret()).context(InvalidApiKeySnafu)?,
        );
        headers.insert(
            "APCA-API-SECRET-KEY",
            header::HeaderValue::from_str(secret_key.expose_secret())
                .context(InvalidApiKeySnafu)?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            _api_key: api_key,
            _secret_key: secret_key,
        })
    }

    /// Points the provider at a different endpoint (paper/sandbox gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Merges paged results into one series per symbol, in first-seen order.
pub(crate) fn merge_pages(
    pages: Vec<AlpacaResponse>,
    params: &BarsRequestParams,
) -> Vec<BarSeries> {
    let mut all_bars: IndexMap<String, Vec<AlpacaBar>> = IndexMap::new();
    for page in pages {
        for (symbol, bars) in page.bars.unwrap_or_default() {
            all_bars.entry(symbol).or_default().extend(bars);
        }
    }

    all_bars
        .into_iter()
        .map(|(symbol, alpaca_bars)| {
            let mut bars: Vec<Bar> = alpaca_bars.into_iter().map(Bar::from).collect();
            bars.sort_by_key(|b| b.timestamp);
            BarSeries {
                symbol,
                timeframe: params.timeframe,
                bars,
            }
        })
        .collect()
}

#[async_trait]
impl DataProvider for AlpacaProvider {
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<Vec<BarSeries>, ProviderError> {
        validate_request(&params)?;

        let mut pages = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            let mut query_params = construct_params(&params);
            if let Some(token) = &next_page_token {
                query_params.push(("page_token".to_string(), token.clone()));
            }

            let response = self
                .client
                .get(&self.base_url)
                .query(&query_params)
                .send()
                .await
                .context(ReqwestSnafu)?;

            let status = response.status();
            let body = response.text().await.context(ReqwestSnafu)?;
            if !status.is_success() {
                return ApiSnafu {
                    message: format!("HTTP {status}: {body}"),
                }
                .fail();
            }

            let page: AlpacaResponse = serde_json::from_str(&body).context(DecodeSnafu)?;
            next_page_token = page.next_page_token.clone();
            pages.push(page);

            if next_page_token.is_none() {
                break;
            }
        }

        tracing::debug!(pages = pages.len(), symbols = ?params.symbols, "alpaca bars fetched");
        Ok(merge_pages(pages, &params))
    }
}
