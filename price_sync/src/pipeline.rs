//! One ingestion run: list symbols, fetch each, normalize, write one batch.
//!
//! Fetch failures are per-symbol and never abort the run; they are collected
//! into [`RunSummary::failures`]. Directory failures, an empty universe and
//! storage errors are fatal and surface as [`PipelineError`].

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use market_data_ingestor::{
    FetchFailed, MarketDataFetcher,
    models::{symbol::Symbol, timeframe::TimeFrame},
    universe::{DirectoryError, SymbolDirectory},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    loader::{LoadError, Loader},
    models::NormalizedRow,
    run::IngestionRun,
    transform::normalize,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("run cancelled before completion")]
    Cancelled,
    #[error("storage task panicked or was aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Cooperative cancellation, checked between symbols.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run needs, built once from configuration.
#[derive(Clone)]
pub struct PipelineDefinition {
    pub directory: Arc<dyn SymbolDirectory>,
    pub fetcher: MarketDataFetcher,
    pub interval: TimeFrame,
    pub window_days: u32,
    pub loader: Loader,
}

#[derive(Debug)]
pub enum SymbolOutcome {
    Fetched {
        symbol: Symbol,
        rows: Vec<NormalizedRow>,
    },
    Failed {
        symbol: Symbol,
        error: FetchFailed,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub symbols_attempted: usize,
    pub symbols_succeeded: usize,
    pub rows_written: usize,
    /// `(symbol, message)` for every symbol whose fetch failed.
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    /// Folds outcomes into a summary plus the batch to write.
    ///
    /// `rows_written` is left at zero; the caller sets it after the write.
    pub fn from_outcomes(outcomes: Vec<SymbolOutcome>) -> (Self, Vec<NormalizedRow>) {
        let mut summary = Self {
            symbols_attempted: outcomes.len(),
            ..Self::default()
        };
        let mut batch = Vec::new();
        for outcome in outcomes {
            match outcome {
                SymbolOutcome::Fetched { rows, .. } => {
                    summary.symbols_succeeded += 1;
                    batch.extend(rows);
                }
                SymbolOutcome::Failed { symbol, error } => {
                    summary.failures.push((symbol.to_string(), error.source.to_string()));
                }
            }
        }
        (summary, batch)
    }
}

/// The unit the scheduler drives. Implemented by [`IngestionPipeline`].
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn execute(&self, run_date: NaiveDate) -> Result<RunSummary, PipelineError>;
}

pub struct IngestionPipeline {
    def: PipelineDefinition,
    cancel: CancelFlag,
}

impl IngestionPipeline {
    pub fn new(def: PipelineDefinition) -> Self {
        Self {
            def,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.def
    }

    pub async fn ensure_table(&self) -> Result<(), PipelineError> {
        let loader = self.def.loader.clone();
        tokio::task::spawn_blocking(move || loader.ensure_table()).await??;
        Ok(())
    }

    #[tracing::instrument(skip(self, run), fields(run_date = %run.run_date))]
    pub async fn run(&self, run: &IngestionRun) -> Result<RunSummary, PipelineError> {
        tracing::info!(
            window_start = %run.window_start,
            window_end = %run.window_end,
            "ingestion run started"
        );

        let symbols = self.def.directory.list_symbols().await?;
        if symbols.is_empty() {
            return Err(DirectoryError::Empty.into());
        }

        self.ensure_table().await?;

        let mut outcomes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if self.cancel.is_cancelled() {
                tracing::warn!(processed = outcomes.len(), "cancellation requested; nothing written");
                return Err(PipelineError::Cancelled);
            }
            let outcome = match self
                .def
                .fetcher
                .fetch_bars(&symbol, run.window_start, run.window_end, self.def.interval)
                .await
            {
                Ok(bars) => {
                    let rows = normalize(&bars, &symbol);
                    tracing::debug!(%symbol, rows = rows.len(), "symbol normalized");
                    SymbolOutcome::Fetched { symbol, rows }
                }
                Err(error) => {
                    tracing::warn!(%symbol, error = %error.source, "fetch failed; symbol skipped");
                    SymbolOutcome::Failed { symbol, error }
                }
            };
            outcomes.push(outcome);
        }

        let (mut summary, batch) = RunSummary::from_outcomes(outcomes);
        if !batch.is_empty() {
            let loader = self.def.loader.clone();
            summary.rows_written =
                tokio::task::spawn_blocking(move || loader.write_batch(&batch)).await??;
        }

        tracing::info!(
            attempted = summary.symbols_attempted,
            succeeded = summary.symbols_succeeded,
            rows = summary.rows_written,
            failed = summary.failures.len(),
            "ingestion run finished"
        );
        Ok(summary)
    }
}

#[async_trait]
impl Pipeline for IngestionPipeline {
    async fn execute(&self, run_date: NaiveDate) -> Result<RunSummary, PipelineError> {
        self.run(&IngestionRun::new(run_date, self.def.window_days)).await
    }
}
