//! Spacing between outbound geocoding requests

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Rate limiter enforcing a minimum interval between requests.
///
/// Callers queue on the internal lock, so requests leave in the order
/// they asked for a slot.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum gap between two requests
    min_interval: Duration,
    /// Earliest instant the next request may start
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Wait until a request may be sent and claim the slot.
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        if self.min_interval.is_zero() {
            return Duration::ZERO;
        }

        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let waited = if *next_slot > now {
            let wait = *next_slot - now;
            debug!("Rate limit: waiting {:.3}s", wait.as_secs_f64());
            sleep(wait).await;
            wait
        } else {
            Duration::ZERO
        };
        *next_slot = Instant::now() + self.min_interval;
        waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_waits_for_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire().await;
        let waited = limiter.acquire().await;
        assert!(waited > Duration::ZERO);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_waits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        for _ in 0..5 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
    }
}
