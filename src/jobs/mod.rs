//! Background job scheduling

pub mod orphan_sweeper;

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::services::extractor::ExtractorService;

/// Run a staging sweep on the blocking pool and log its outcome
pub async fn run_sweep(extractor: Arc<ExtractorService>, max_age: Duration) {
    match tokio::task::spawn_blocking(move || orphan_sweeper::sweep(&extractor, max_age)).await {
        Ok(Ok(report)) => info!(
            recovered = report.recovered,
            swept = report.swept,
            "Staging sweep finished"
        ),
        Ok(Err(e)) => tracing::error!("Staging sweep error: {:#}", e),
        Err(e) => tracing::error!("Staging sweep panicked: {}", e),
    }
}

/// Initialize and start the job scheduler
pub async fn start_scheduler(
    extractor: Arc<ExtractorService>,
    orphan_max_age: Duration,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Staging sweep - run hourly
    let sweep_job = Job::new_async("0 0 * * * *", move |_uuid, _l| {
        let extractor = extractor.clone();
        Box::pin(async move {
            run_sweep(extractor, orphan_max_age).await;
        })
    })?;
    scheduler.add(sweep_job).await?;

    scheduler.start().await?;
    Ok(scheduler)
}
