//! Interval jobs: fixed cron schedules over tokio-cron-scheduler.
//!
//! A shared in-flight counter covers every interval job; `stop` drains it
//! with a coarse fixed-interval poll before shutting the cron scheduler
//! down. Long-running job bodies are expected to check the context's
//! cancellation flag cooperatively.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler as TokioCronScheduler};

use crate::error::{EngineError, EngineResult};
use crate::scheduler::JobContext;

#[async_trait]
pub trait IntervalJob: Send + Sync {
    fn name(&self) -> &str;

    /// Cron expression with seconds field, e.g. `"0 */5 * * * *"`.
    fn schedule(&self) -> &str;

    /// Skip a tick while the previous one for this job is still running,
    /// instead of running the two in parallel.
    fn prevent_overrun(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &JobContext) -> anyhow::Result<()>;
}

/// Drives every registered interval job on its own schedule.
pub struct IntervalRunner {
    scheduler: Mutex<TokioCronScheduler>,
    jobs: Vec<Arc<dyn IntervalJob>>,
    context: JobContext,
    in_flight: Arc<AtomicUsize>,
    drain_poll: Duration,
}

impl IntervalRunner {
    pub async fn new(jobs: Vec<Arc<dyn IntervalJob>>, drain_poll: Duration) -> EngineResult<Self> {
        let scheduler = TokioCronScheduler::new()
            .await
            .map_err(|e| EngineError::Internal {
                source: anyhow::Error::from(e),
            })?;

        Ok(Self {
            scheduler: Mutex::new(scheduler),
            jobs,
            context: JobContext::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            drain_poll,
        })
    }

    pub async fn start(&self) -> EngineResult<()> {
        for job in &self.jobs {
            let cron_job = self.build_cron_job(Arc::clone(job))?;
            self.scheduler
                .lock()
                .await
                .add(cron_job)
                .await
                .map_err(|e| EngineError::Internal {
                    source: anyhow::Error::from(e),
                })?;
        }
        self.scheduler
            .lock()
            .await
            .start()
            .await
            .map_err(|e| EngineError::Internal {
                source: anyhow::Error::from(e),
            })?;
        Ok(())
    }

    fn build_cron_job(&self, job: Arc<dyn IntervalJob>) -> EngineResult<Job> {
        let ctx = self.context.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let running = Arc::new(AtomicBool::new(false));

        let schedule = job.schedule().to_string();
        Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let job = Arc::clone(&job);
            let ctx = ctx.clone();
            let in_flight = Arc::clone(&in_flight);
            let running = Arc::clone(&running);

            Box::pin(async move {
                if ctx.is_cancellation_requested() {
                    return;
                }
                if job.prevent_overrun() && running.swap(true, Ordering::SeqCst) {
                    tracing::warn!(job = job.name(), "previous tick still running, skipping");
                    return;
                }

                in_flight.fetch_add(1, Ordering::SeqCst);
                if let Err(error) = job.process(&ctx).await {
                    tracing::error!(job = job.name(), error = %error, "interval job tick failed");
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);
                running.store(false, Ordering::SeqCst);
            })
        })
        .map_err(|e| EngineError::Internal {
            source: anyhow::Error::from(e),
        })
    }

    /// Flip the shared cancellation flag, poll until no tick is in flight,
    /// then shut the cron scheduler down.
    pub async fn stop(&self) -> EngineResult<()> {
        self.context.cancel();
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(self.drain_poll).await;
        }
        self.scheduler
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| EngineError::Internal {
                source: anyhow::Error::from(e),
            })?;
        Ok(())
    }
}
