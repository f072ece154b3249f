//! Client-side request throttling for any [`DataProvider`].

use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;

use crate::{
    models::{bar_series::BarSeries, request_params::BarsRequestParams},
    providers::{DataProvider, ProviderError},
};

/// Alpaca's free-tier ceiling.
pub const DEFAULT_REQUESTS_PER_MINUTE: NonZeroU32 = nonzero!(200u32);

/// Wraps a provider so that each `fetch_bars` call first waits for a
/// token from a per-minute quota.
pub struct Throttled<P> {
    inner: P,
    limiter: DefaultDirectRateLimiter,
}

impl<P: DataProvider> Throttled<P> {
    pub fn new(inner: P, per_minute: NonZeroU32) -> Self {
        Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: DataProvider> DataProvider for Throttled<P> {
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<Vec<BarSeries>, ProviderError> {
        self.limiter.until_ready().await;
        self.inner.fetch_bars(params).await
    }
}
