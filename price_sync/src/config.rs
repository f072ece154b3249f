//! TOML configuration: parsing, defaults and validation.
//!
//! ```toml
//! [storage]
//! table = "stock_prices"
//! database_url = "sqlite://prices.db"   # or DATABASE_URL
//! unique_key = false
//!
//! [ingest]
//! provider = "yahoo"                    # or "alpaca"
//! interval = "1D"
//! window_days = 7
//! requests_per_minute = 200
//!
//! [ingest.alpaca]                       # only with provider = "alpaca"
//! feed = "iex"                          # "sip" needs a paid subscription
//! adjustment = "split"                  # raw | split | dividend | all
//!
//! [schedule]
//! retries = 2
//! retry_delay_secs = 300
//! cadence = "daily"                     # or "weekdays"
//! catchup = true
//! start_date = "2025-04-26"
//! fire_at = "00:00:00"
//! lease_ttl_secs = 3600
//!
//! [universe]
//! source = "csv"                        # or "static" with `symbols = [...]`
//! ```
//!
//! Every section and key is optional except `database_url`, which falls back to
//! the `DATABASE_URL` environment variable. Unknown keys are rejected.

use std::{num::NonZeroU32, path::Path, time::Duration};

use anyhow::{Context, bail};
use chrono::{NaiveDate, NaiveTime};
use market_data_ingestor::{
    models::{request_params::ProviderParams, symbol::Symbol, timeframe::TimeFrame},
    providers::{alpaca_rest::AlpacaBarsParams, throttle::DEFAULT_REQUESTS_PER_MINUTE},
    universe::{DEFAULT_COLUMN, DEFAULT_LISTING_URL},
};
use serde::Deserialize;
use shared_utils::env::value_or_env;

use crate::{
    schedule::{Cadence, RetryPolicy, RunPolicy},
    table::TableName,
};

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// One week.
pub const MAX_LEASE_TTL_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageCfg,
    #[serde(default)]
    pub ingest: IngestCfg,
    #[serde(default)]
    pub schedule: ScheduleCfg,
    #[serde(default)]
    pub universe: UniverseCfg,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageCfg {
    pub table: TableName,
    pub database_url: Option<String>,
    pub unique_key: bool,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            table: TableName::default(),
            database_url: None,
            unique_key: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Yahoo,
    Alpaca,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IngestCfg {
    pub provider: ProviderKind,
    pub interval: TimeFrame,
    pub window_days: u32,
    /// Client-side request ceiling for the provider.
    pub requests_per_minute: NonZeroU32,
    /// Extra query options for the Alpaca bars endpoint.
    pub alpaca: AlpacaBarsParams,
}

impl Default for IngestCfg {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            interval: TimeFrame::day(),
            window_days: 7,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            alpaca: AlpacaBarsParams::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScheduleCfg {
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub cadence: Cadence,
    pub catchup: bool,
    pub start_date: NaiveDate,
    pub fire_at: NaiveTime,
    pub lease_ttl_secs: u64,
}

pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 26).unwrap_or(NaiveDate::MIN)
}

impl Default for ScheduleCfg {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_delay_secs: 300,
            cadence: Cadence::Daily,
            catchup: true,
            start_date: default_start_date(),
            fire_at: NaiveTime::MIN,
            lease_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case", deny_unknown_fields)]
pub enum UniverseCfg {
    Static {
        symbols: Vec<String>,
    },
    Csv {
        #[serde(default = "default_listing_url")]
        url: String,
        #[serde(default = "default_listing_column")]
        column: String,
    },
}

fn default_listing_url() -> String {
    DEFAULT_LISTING_URL.to_string()
}

fn default_listing_column() -> String {
    DEFAULT_COLUMN.to_string()
}

impl Default for UniverseCfg {
    fn default() -> Self {
        UniverseCfg::Csv {
            url: default_listing_url(),
            column: default_listing_column(),
        }
    }
}

/// Validated universe source.
#[derive(Debug, Clone, PartialEq)]
pub enum Universe {
    Static(Vec<Symbol>),
    Csv { url: String, column: String },
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub table: TableName,
    pub unique_key: bool,
    pub provider: ProviderKind,
    pub interval: TimeFrame,
    pub window_days: u32,
    pub requests_per_minute: NonZeroU32,
    pub provider_params: ProviderParams,
    pub run_policy: RunPolicy,
    pub fire_at: NaiveTime,
    pub universe: Universe,
}

impl Config {
    /// Checks cross-field rules and resolves environment fallbacks.
    pub fn validate(self) -> anyhow::Result<Settings> {
        let database_url = value_or_env(self.storage.database_url.as_deref(), DATABASE_URL_ENV)
            .context("storage.database_url is not set")?;

        if !self.ingest.interval.is_daily_or_coarser() {
            bail!(
                "ingest.interval must be daily or coarser, got {}",
                self.ingest.interval
            );
        }
        if self.ingest.window_days == 0 {
            bail!("ingest.window_days must be at least 1");
        }
        let provider_params = match self.ingest.provider {
            _ if self.ingest.alpaca.is_empty() => ProviderParams::None,
            ProviderKind::Alpaca => ProviderParams::Alpaca(self.ingest.alpaca),
            other => bail!("[ingest.alpaca] options require provider = \"alpaca\", got {other:?}"),
        };
        if !(1..=MAX_LEASE_TTL_SECS).contains(&self.schedule.lease_ttl_secs) {
            bail!("schedule.lease_ttl_secs must be between 1 and {MAX_LEASE_TTL_SECS}");
        }

        let universe = match self.universe {
            UniverseCfg::Static { symbols } => {
                let symbols = symbols
                    .iter()
                    .map(|s| Symbol::new(s))
                    .collect::<Result<Vec<_>, _>>()
                    .context("invalid symbol in universe.symbols")?;
                if symbols.is_empty() {
                    bail!("universe.symbols must not be empty");
                }
                Universe::Static(symbols)
            }
            UniverseCfg::Csv { url, column } => {
                let (url, column) = (url.trim().to_string(), column.trim().to_string());
                if url.is_empty() || column.is_empty() {
                    bail!("universe.url and universe.column must not be empty");
                }
                Universe::Csv { url, column }
            }
        };

        let s = self.schedule;
        let run_policy = RunPolicy {
            retry: RetryPolicy::new(s.retries, Duration::from_secs(s.retry_delay_secs)),
            cadence: s.cadence,
            catchup: s.catchup,
            start_date: s.start_date,
            lease_ttl: chrono::Duration::seconds(s.lease_ttl_secs as i64),
        };

        Ok(Settings {
            database_url,
            table: self.storage.table,
            unique_key: self.storage.unique_key,
            provider: self.ingest.provider,
            interval: self.ingest.interval,
            window_days: self.ingest.window_days,
            requests_per_minute: self.ingest.requests_per_minute,
            provider_params,
            run_policy,
            fire_at: s.fire_at,
            universe,
        })
    }
}

/// Parse and validate configuration from a TOML string.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<Settings> {
    let cfg: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
    cfg.validate().context("invalid configuration")
}

/// Read a config TOML file from disk, parse and validate it.
pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<Settings> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    load_config_str(&s).with_context(|| format!("in {}", path.display()))
}
