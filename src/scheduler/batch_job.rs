//! Wires the batch processor into the polling runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::processing::BatchProcessor;
use crate::scheduler::{JobContext, PollingJob};

/// The always-running job driving batch processing: one task per busy tick,
/// idle backoff once the queue drains.
pub struct BatchPollingJob {
    processor: Arc<BatchProcessor>,
    idle_interval: Duration,
    busy_interval: Duration,
}

impl BatchPollingJob {
    pub fn new(
        processor: Arc<BatchProcessor>,
        idle_interval: Duration,
        busy_interval: Duration,
    ) -> Self {
        Self {
            processor,
            idle_interval,
            busy_interval,
        }
    }
}

#[async_trait]
impl PollingJob for BatchPollingJob {
    fn name(&self) -> &str {
        "batch-processing"
    }

    async fn process(&self, ctx: &JobContext) -> anyhow::Result<bool> {
        Ok(self.processor.process(ctx).await)
    }

    fn idle_interval(&self) -> Duration {
        self.idle_interval
    }

    fn busy_interval(&self) -> Duration {
        self.busy_interval
    }
}
