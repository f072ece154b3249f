//! Long-running mode: a daily cron job that performs a catchup pass.

use std::sync::Arc;

use chrono::{NaiveTime, Timelike, Utc};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use super::{RunOutcome, Scheduler, SchedulerError};

fn cron_err(e: JobSchedulerError) -> SchedulerError {
    SchedulerError::Cron(e.to_string())
}

/// Six-field (seconds first) cron expression firing once a day at `at` UTC.
pub fn daily_expression(at: NaiveTime) -> String {
    format!("{} {} {} * * *", at.second(), at.minute(), at.hour())
}

/// One catchup pass for today. Passes never overlap; a firing that arrives
/// while the previous pass is still running waits for it.
pub async fn catchup_pass(scheduler: &Scheduler, gate: &Mutex<()>) {
    let _pass = gate.lock().await;
    let today = Utc::now().date_naive();
    match scheduler.catchup(today).await {
        Ok(results) => {
            let failed = results
                .iter()
                .filter(|(_, o)| matches!(o, RunOutcome::Failed { .. }))
                .count();
            tracing::info!(runs = results.len(), failed, "catchup pass finished");
        }
        Err(e) => tracing::error!(error = %e, "catchup pass aborted"),
    }
}

/// Runs a pass now, then once a day at `fire_at` UTC until Ctrl-C.
pub async fn serve(scheduler: Arc<Scheduler>, fire_at: NaiveTime) -> Result<(), SchedulerError> {
    let gate = Arc::new(Mutex::new(()));
    catchup_pass(&scheduler, &gate).await;

    let mut sched = JobScheduler::new().await.map_err(cron_err)?;
    let expr = daily_expression(fire_at);
    let job = {
        let scheduler = Arc::clone(&scheduler);
        let gate = Arc::clone(&gate);
        Job::new_async(expr.as_str(), move |_id, _jobs| {
            let scheduler = Arc::clone(&scheduler);
            let gate = Arc::clone(&gate);
            Box::pin(async move {
                catchup_pass(&scheduler, &gate).await;
            })
        })
        .map_err(cron_err)?
    };
    sched.add(job).await.map_err(cron_err)?;
    sched.start().await.map_err(cron_err)?;
    tracing::info!(cron = %expr, "serving; waiting for Ctrl-C");

    tokio::signal::ctrl_c().await.map_err(SchedulerError::Signal)?;
    tracing::info!("shutdown requested");
    scheduler.cancel();
    sched.shutdown().await.map_err(cron_err)?;
    Ok(())
}
