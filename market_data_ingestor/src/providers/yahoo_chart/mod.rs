//! Yahoo Finance v8 chart provider.
//!
//! The chart endpoint serves one symbol per request, so multi-symbol requests
//! are issued sequentially. Bars with any missing OHLCV field (Yahoo emits
//! `null` for halted sessions) are dropped.

pub mod provider;
pub mod response;

pub use provider::YahooChartProvider;
