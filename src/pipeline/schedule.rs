use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

/// Gate between crawl cycles. Returns `false` to end the run loop.
#[async_trait]
pub trait CycleTrigger: Send {
    async fn wait_next(&mut self) -> bool;
}

/// Production trigger: sleep for the interval, forever.
pub struct IntervalTrigger {
    interval: Duration,
}

impl IntervalTrigger {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl CycleTrigger for IntervalTrigger {
    async fn wait_next(&mut self) -> bool {
        info!("💤 Next check in {} min", self.interval.as_secs() / 60);
        sleep(self.interval).await;
        true
    }
}

/// Allows a fixed number of further cycles, without sleeping.
pub struct CountedTrigger {
    remaining: usize,
}

impl CountedTrigger {
    /// `cycles` is the total number of cycles the run loop will execute.
    pub fn new(cycles: usize) -> Self {
        Self { remaining: cycles.saturating_sub(1) }
    }
}

#[async_trait]
impl CycleTrigger for CountedTrigger {
    async fn wait_next(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interval_trigger_sleeps_full_interval() {
        let mut trigger = IntervalTrigger::new(Duration::from_secs(45 * 60));
        let start = tokio::time::Instant::now();
        assert!(trigger.wait_next().await);
        assert!(start.elapsed() >= Duration::from_secs(45 * 60));
    }

    #[tokio::test]
    async fn test_counted_trigger() {
        let mut once = CountedTrigger::new(1);
        assert!(!once.wait_next().await);

        let mut three = CountedTrigger::new(3);
        assert!(three.wait_next().await);
        assert!(three.wait_next().await);
        assert!(!three.wait_next().await);
    }
}
