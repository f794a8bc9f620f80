use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Pacing gate in front of an external dependency.
pub trait RateLimiter {
    /// Wait until the next call is permitted.
    async fn acquire(&self);
}

/// Enforces a minimum spacing between consecutive acquisitions.
pub struct FixedInterval {
    last: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl FixedInterval {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last: Mutex::new(None),
            min_interval,
        }
    }
}

impl RateLimiter for FixedInterval {
    async fn acquire(&self) {
        let mut last = self.last.lock().await;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Never waits.
#[cfg(test)]
pub struct Unpaced;

#[cfg(test)]
impl RateLimiter for Unpaced {
    async fn acquire(&self) {}
}
