//! Symbol universe discovery.
//!
//! A [`SymbolDirectory`] answers "which tickers should this run ingest?".
//! It is consulted once per run and never retried; a failure aborts the run.

mod csv_listing;
mod static_list;

pub use csv_listing::{CsvListingDirectory, DEFAULT_COLUMN, DEFAULT_LISTING_URL, parse_listing};
pub use static_list::StaticDirectory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::symbol::Symbol;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("symbol listing unavailable: {0}")]
    Unavailable(String),
    #[error("symbol listing returned no usable symbols")]
    Empty,
}

#[async_trait]
pub trait SymbolDirectory: Send + Sync {
    /// Returns the current universe in source order, without duplicates.
    async fn list_symbols(&self) -> Result<Vec<Symbol>, DirectoryError>;
}

#[async_trait]
impl<D: SymbolDirectory + ?Sized> SymbolDirectory for Arc<D> {
    async fn list_symbols(&self) -> Result<Vec<Symbol>, DirectoryError> {
        (**self).list_symbols().await
    }
}
