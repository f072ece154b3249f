use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use price_sync::{
    app,
    config::{Settings, load_config_path},
    db::{connection::connect_sqlite, migrate},
    ledger::{RunLedger, RunState, SqliteRunLedger, count_in_state},
    pipeline::CancelFlag,
    schedule::{RunOutcome, cron},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Daily OHLCV ingestion into SQLite")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short, value_name = "FILE", default_value = "price_sync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Single attempt for one run date; the exit status reports the result.
    Run {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: NaiveDate,
        /// Re-run even if the date already succeeded.
        #[arg(long)]
        force: bool,
    },
    /// Run every missed date up to today with retries, then exit.
    Catchup,
    /// Catch up now, then once a day at `schedule.fire_at` UTC until Ctrl-C.
    Serve,
    /// Create or validate the destination table.
    EnsureTable,
    /// Show recent runs from the ledger.
    Status {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}

fn print_outcome(date: NaiveDate, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Succeeded { summary, attempts } => println!(
            "{date}  success  attempts={attempts} symbols={}/{} rows={} failures={}",
            summary.symbols_succeeded,
            summary.symbols_attempted,
            summary.rows_written,
            summary.failures.len()
        ),
        RunOutcome::Failed { attempts, error } => {
            println!("{date}  failed   attempts={attempts} error={error}")
        }
        RunOutcome::Cancelled => println!("{date}  cancelled"),
        RunOutcome::Skipped(reason) => println!("{date}  skipped  reason={reason:?}"),
    }
}

async fn ensure_table(settings: &Settings) -> Result<()> {
    let loader = app::build_loader(settings);
    tokio::task::spawn_blocking(move || loader.ensure_table()).await??;
    Ok(())
}

async fn status(settings: &Settings, limit: i64) -> Result<()> {
    let url = settings.database_url.clone();
    let (records, failed) = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut conn = connect_sqlite(&url)?;
        let records = SqliteRunLedger::new().list(&mut conn, limit)?;
        let failed = count_in_state(&mut conn, RunState::Failed)?;
        Ok((records, failed))
    })
    .await??;

    println!("{:<12} {:<9} {:>8} {:>8}  last_error", "run_date", "state", "attempts", "rows");
    for r in records {
        println!(
            "{:<12} {:<9} {:>8} {:>8}  {}",
            r.run_date,
            r.state,
            r.attempts,
            r.rows_written,
            r.last_error.as_deref().unwrap_or("")
        );
    }
    if failed > 0 {
        println!("\n{failed} run date(s) failed terminally and need attention.");
    }
    Ok(())
}

async fn real_main(cli: Cli) -> Result<ExitCode> {
    let settings = load_config_path(&cli.config)?;
    migrate::run_sqlite(&settings.database_url).context("failed to prepare run ledger")?;

    match cli.cmd {
        Cmd::EnsureTable => {
            ensure_table(&settings).await?;
            println!("table {} is ready", settings.table);
        }
        Cmd::Status { limit } => status(&settings, limit).await?,
        Cmd::Run { date, force } => {
            let scheduler = app::build_scheduler(&settings, CancelFlag::default())?;
            let outcome = scheduler.run_once(date, force).await?;
            print_outcome(date, &outcome);
            if !outcome.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Cmd::Catchup => {
            let scheduler = app::build_scheduler(&settings, CancelFlag::default())?;
            let results = scheduler.catchup(Utc::now().date_naive()).await?;
            for (date, outcome) in &results {
                print_outcome(*date, outcome);
            }
            if results
                .iter()
                .any(|(_, o)| matches!(o, RunOutcome::Failed { .. }))
            {
                return Ok(ExitCode::FAILURE);
            }
        }
        Cmd::Serve => {
            let scheduler = Arc::new(app::build_scheduler(&settings, CancelFlag::default())?);
            cron::serve(scheduler, settings.fire_at).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match real_main(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
