//! Wiring from [`Settings`] to a runnable pipeline and scheduler.

use std::sync::Arc;

use anyhow::Context;
use market_data_ingestor::{
    MarketDataFetcher,
    providers::{
        DataProvider, alpaca_rest::AlpacaProvider, throttle::Throttled,
        yahoo_chart::YahooChartProvider,
    },
    universe::{CsvListingDirectory, StaticDirectory, SymbolDirectory},
};

use crate::{
    config::{ProviderKind, Settings, Universe},
    loader::Loader,
    pipeline::{CancelFlag, IngestionPipeline, PipelineDefinition},
    schedule::Scheduler,
};

pub fn build_provider(settings: &Settings) -> anyhow::Result<Arc<dyn DataProvider>> {
    let rpm = settings.requests_per_minute;
    Ok(match settings.provider {
        ProviderKind::Yahoo => {
            let p = YahooChartProvider::new().context("failed to build Yahoo provider")?;
            Arc::new(Throttled::new(p, rpm))
        }
        ProviderKind::Alpaca => {
            let p = AlpacaProvider::new().context("failed to build Alpaca provider")?;
            Arc::new(Throttled::new(p, rpm))
        }
    })
}

pub fn build_directory(settings: &Settings) -> anyhow::Result<Arc<dyn SymbolDirectory>> {
    Ok(match &settings.universe {
        Universe::Static(symbols) => Arc::new(StaticDirectory::new(symbols.clone())),
        Universe::Csv { url, column } => Arc::new(
            CsvListingDirectory::new(url.clone(), column.clone())
                .context("failed to build symbol listing client")?,
        ),
    })
}

pub fn build_loader(settings: &Settings) -> Loader {
    Loader::new(
        settings.database_url.clone(),
        settings.table.clone(),
        settings.unique_key,
    )
}

pub fn build_definition(settings: &Settings) -> anyhow::Result<PipelineDefinition> {
    Ok(PipelineDefinition {
        directory: build_directory(settings)?,
        fetcher: MarketDataFetcher::new(build_provider(settings)?)
            .with_provider_params(settings.provider_params.clone()),
        interval: settings.interval,
        window_days: settings.window_days,
        loader: build_loader(settings),
    })
}

/// Builds the pipeline and a scheduler around it sharing one cancel flag.
pub fn build_scheduler(settings: &Settings, cancel: CancelFlag) -> anyhow::Result<Scheduler> {
    let pipeline = IngestionPipeline::new(build_definition(settings)?).with_cancel_flag(cancel.clone());
    Ok(Scheduler::new(
        Arc::new(pipeline),
        settings.database_url.clone(),
        settings.run_policy.clone(),
    )
    .with_cancel_flag(cancel))
}
