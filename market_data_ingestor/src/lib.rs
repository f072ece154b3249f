pub mod fetcher;
pub mod models;
pub mod providers;
pub mod universe;

pub use fetcher::{FetchFailed, MarketDataFetcher};
