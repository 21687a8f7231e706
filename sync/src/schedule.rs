//! Cron triggers for the four operations.
//!
//! Expressions use the six-field form with seconds, e.g. `0 0 6 * * *` for
//! 06:00 every day. Scheduled runs go through the same [`RunRegistry`] as the
//! HTTP triggers.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::api::{RunError, RunRegistry};
use crate::config::ScheduleConfig;
use crate::service::{Operation, SyncService};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid {operation} schedule {cron:?}: {source}")]
    InvalidCron {
        operation: Operation,
        cron: String,
        source: JobSchedulerError,
    },
    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

/// Configured (operation, cron) pairs in a fixed order.
pub fn planned(cfg: &ScheduleConfig) -> Vec<(Operation, &str)> {
    Operation::ALL
        .into_iter()
        .filter_map(|op| {
            let cron = match op {
                Operation::Refresh => &cfg.refresh,
                Operation::Enrich => &cfg.enrich,
                Operation::Sync => &cfg.sync,
                Operation::Changelog => &cfg.changelog,
            };
            cron.as_deref().map(|c| (op, c))
        })
        .collect()
}

fn job(
    operation: Operation,
    cron: &str,
    service: Arc<SyncService>,
    runs: Arc<RunRegistry>,
) -> Result<Job, ScheduleError> {
    Job::new_async(cron, move |_uuid, _l| {
        let service = service.clone();
        let runs = runs.clone();
        Box::pin(async move {
            match runs.run_exclusive(&service, operation).await {
                Ok(report) => tracing::info!(
                    %operation,
                    run_id = %report.run_id,
                    processed = report.processed,
                    failed = report.failed,
                    "Scheduled run complete"
                ),
                // logged by the registry
                Err(RunError::AlreadyRunning(_)) => {}
                Err(e) => tracing::error!(%operation, error = %e, "Scheduled run failed"),
            }
        })
    })
    .map_err(|source| ScheduleError::InvalidCron {
        operation,
        cron: cron.to_string(),
        source,
    })
}

/// Build and start a scheduler for every configured expression. Returns
/// `None` when nothing is scheduled.
pub async fn start(
    cfg: &ScheduleConfig,
    service: Arc<SyncService>,
    runs: Arc<RunRegistry>,
) -> Result<Option<JobScheduler>, ScheduleError> {
    let plan = planned(cfg);
    if plan.is_empty() {
        tracing::info!("No schedules configured");
        return Ok(None);
    }

    let jobs = plan
        .iter()
        .map(|(op, cron)| job(*op, cron, service.clone(), runs.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let sched = JobScheduler::new().await?;
    for job in jobs {
        sched.add(job).await?;
    }
    sched.start().await?;

    for (op, cron) in &plan {
        tracing::info!(operation = %op, cron = %cron, "Schedule active");
    }
    Ok(Some(sched))
}
