//! Job runners and the scheduler composition root.
//!
//! Two job kinds exist. Polling jobs run in a continuous self-rescheduling
//! loop and report whether more work remains, which picks the next poll
//! interval. Interval jobs run on a cron schedule. The [`JobScheduler`] owns
//! one runner of each kind and is the only surface the host process
//! lifecycle talks to.

pub mod batch_job;
pub mod interval;
pub mod polling;
pub mod types;

use crate::error::EngineResult;

pub use batch_job::BatchPollingJob;
pub use interval::{IntervalJob, IntervalRunner};
pub use polling::{PollingJob, PollingRunner};
pub use types::JobContext;

/// Composition root over both runners. Jobs are injected, never pulled from
/// ambient registries, so schedulers can coexist in tests.
pub struct JobScheduler {
    polling: PollingRunner,
    interval: IntervalRunner,
}

impl JobScheduler {
    pub async fn new(
        polling_jobs: Vec<std::sync::Arc<dyn PollingJob>>,
        interval_jobs: Vec<std::sync::Arc<dyn IntervalJob>>,
        drain_poll: std::time::Duration,
    ) -> EngineResult<Self> {
        Ok(Self {
            polling: PollingRunner::new(polling_jobs),
            interval: IntervalRunner::new(interval_jobs, drain_poll).await?,
        })
    }

    /// Start both runners. Polling jobs tick immediately; interval jobs wait
    /// for their first scheduled slot.
    pub async fn start(&self) -> EngineResult<()> {
        self.polling.start().await;
        self.interval.start().await?;
        tracing::info!("job scheduler started");
        Ok(())
    }

    /// Stop both runners concurrently, awaiting in-flight work on each.
    pub async fn stop(&self) -> EngineResult<()> {
        let (polling, interval) = futures::join!(self.polling.stop(), self.interval.stop());
        polling?;
        interval?;
        tracing::info!("job scheduler stopped");
        Ok(())
    }
}
