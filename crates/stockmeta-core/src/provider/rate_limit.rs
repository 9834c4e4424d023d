//! Minimum-interval request gate for network-backed providers.
//!
//! With `requests_per_minute = N`, consecutive request starts on one gate are
//! at least `60 / N` seconds apart. The lock is held across the sleep, so
//! concurrent callers queue up and start one after another.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializes request start times on one provider instance.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// `requests_per_minute == 0` disables the gate.
    pub fn new(requests_per_minute: u32) -> Self {
        let interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / requests_per_minute as f64)
        };
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next request may start, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                tracing::debug!("Rate limit gate: waiting {}ms", wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_calls_are_one_second_apart() {
        let limiter = RateLimiter::new(60);
        limiter.acquire().await;
        let first = Instant::now();
        limiter.acquire().await;
        let second = Instant::now();
        assert!(second - first >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_does_not_wait() {
        let limiter = RateLimiter::new(60);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now() - start, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_serialize() {
        let limiter = Arc::new(RateLimiter::new(120));
        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap() - start);
        }
        starts.sort();
        assert!(starts[1] >= Duration::from_millis(500));
        assert!(starts[2] >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rpm_disables_gate() {
        let limiter = RateLimiter::new(0);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(Instant::now() - start, Duration::ZERO);
    }
}
