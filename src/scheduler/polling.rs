//! Always-running jobs: a continuous poll loop per job.
//!
//! Each job gets its own spawned loop; one job's failure or backoff never
//! blocks another. A tick that fails is logged and treated as "no more
//! work", so the loop backs off to the idle interval instead of spinning.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::EngineResult;
use crate::scheduler::JobContext;

/// A self-rescheduling unit of work. `process` reports whether more work
/// remains, which selects the busy or idle interval before the next tick.
#[async_trait]
pub trait PollingJob: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, ctx: &JobContext) -> anyhow::Result<bool>;

    /// Wait after a tick that found nothing to do.
    fn idle_interval(&self) -> Duration;

    /// Wait after a tick that reported remaining work.
    fn busy_interval(&self) -> Duration;
}

/// Drives every registered polling job in its own loop.
pub struct PollingRunner {
    jobs: Vec<Arc<dyn PollingJob>>,
    context: JobContext,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PollingRunner {
    pub fn new(jobs: Vec<Arc<dyn PollingJob>>) -> Self {
        Self {
            jobs,
            context: JobContext::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one loop per job. Every job ticks immediately.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for job in &self.jobs {
            let job = Arc::clone(job);
            let ctx = self.context.clone();
            tracing::info!(job = job.name(), "starting polling job");
            handles.push(tokio::spawn(run_loop(job, ctx)));
        }
    }

    /// Cancel the pending sleeps and await every in-flight tick. No tick is
    /// abandoned mid-flight.
    pub async fn stop(&self) -> EngineResult<()> {
        self.context.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(error) = handle.await {
                tracing::error!(error = %error, "polling job loop panicked");
            }
        }
        Ok(())
    }
}

async fn run_loop(job: Arc<dyn PollingJob>, ctx: JobContext) {
    loop {
        if ctx.is_cancellation_requested() {
            break;
        }

        let started = Instant::now();
        let has_more_work = match job.process(&ctx).await {
            Ok(has_more_work) => has_more_work,
            Err(error) => {
                tracing::error!(job = job.name(), error = %error, "polling job tick failed");
                false
            }
        };
        tracing::debug!(
            job = job.name(),
            duration_ms = started.elapsed().as_millis() as u64,
            has_more_work,
            "polling job tick finished"
        );

        let wait = if has_more_work {
            job.busy_interval()
        } else {
            job.idle_interval()
        };
        tokio::select! {
            _ = ctx.token().cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }
    tracing::info!(job = job.name(), "polling job stopped");
}
