//! FIFO rate limiter for outbound calls to the upstream market-data API (C2).
//!
//! A single mutex guards the last-request timestamp. `acquire` computes the
//! remaining wait as `interval - (now - last)`; if positive, it sleeps for
//! that duration while holding the mutex, then stamps `last = now()`.
//! Holding the mutex across the sleep is what gives FIFO ordering: the next
//! caller cannot even compute its own wait until the current sleeper's turn
//! is over.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Requests-per-minute for each known plan. Unknown plans degrade to `free`.
fn plan_rpm(plan: &str) -> u32 {
    let plans: HashMap<&str, u32> =
        HashMap::from([("free", 5), ("light", 60), ("standard", 120), ("premium", 500)]);
    plans.get(plan).copied().unwrap_or(5)
}

/// Minimum interval between requests: `(60 / rpm) * 1.1` (a 10% safety margin).
fn interval_for_plan(plan: &str) -> Duration {
    let rpm = plan_rpm(plan) as f64;
    Duration::from_secs_f64((60.0 / rpm) * 1.1)
}

pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(plan: &str) -> Self {
        Self {
            interval: interval_for_plan(plan),
            last_request: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Acquire a rate-limit slot, sleeping if necessary. Serves callers in
    /// strict FIFO order since the mutex is held across the sleep.
    ///
    /// Cancellation-safe: if this future is dropped while sleeping, the
    /// timestamp is never bumped, so the limiter's invariants are preserved
    /// for whoever acquires the mutex next.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        let now = Instant::now();
        if let Some(last_instant) = *last {
            let elapsed = now.duration_since(last_instant);
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_plan_degrades_to_free() {
        let limiter = RateLimiter::new("nonexistent");
        let free = RateLimiter::new("free");
        assert_eq!(limiter.interval(), free.interval());
    }

    #[tokio::test]
    async fn premium_interval_matches_formula() {
        let limiter = RateLimiter::new("premium");
        let expected = Duration::from_secs_f64((60.0 / 500.0) * 1.1);
        assert_eq!(limiter.interval(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn serves_callers_fifo_with_minimum_gap() {
        let limiter = Arc::new(RateLimiter::new("premium"));
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                order.lock().await.push(i);
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2]);
    }
}
