//! Sleep abstraction for the polling loop.

use std::time::Duration;

use async_trait::async_trait;

/// Source of suspension between poll ticks.
///
/// Production code uses [`TokioClock`]; tests inject a recording clock to
/// observe how long the poller waited without waiting for real.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
