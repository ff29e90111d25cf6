//! C3 - Rate Limiter: blocking per-origin minimum spacing between outbound requests.
//!
//! Keyed by host, like the teacher's `DashMap<String, Arc<DomainRateLimiter>>`, but the
//! teacher's lock-free token-bucket (`RateLimitDecision::{Allow, Deny}`) is replaced with
//! the blocking read-sleep-write design SPEC_FULL.md calls for directly: `acquire` does
//! not return a decision for the caller to act on, it sleeps until the spacing is
//! satisfied and then returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

pub struct RateLimiter {
    request_delay: Duration,
    last_request: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl RateLimiter {
    pub fn new(request_delay: Duration) -> Self {
        Self {
            request_delay,
            last_request: DashMap::new(),
        }
    }

    /// Blocks the caller until at least `request_delay` has elapsed since the last
    /// recorded request for `host`, then records now as the new timestamp. Zero delay is
    /// a no-op. The per-host mutex serializes the read-modify-sleep-write; the sleep
    /// itself happens with the mutex held, so concurrent callers for the same host queue
    /// up in order rather than all waking at once and racing (fairness is not required,
    /// but this is simpler than releasing/reacquiring).
    pub async fn acquire(&self, host: &str) {
        if self.request_delay.is_zero() {
            return;
        }

        let slot = self
            .last_request
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut last = slot.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_out_the_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire("h").await;
        limiter.acquire("h").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn different_hosts_do_not_block_each_other() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        limiter.acquire("h1").await;
        let start = Instant::now();
        limiter.acquire("h2").await;
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn zero_delay_never_blocks() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        limiter.acquire("h").await;
        limiter.acquire("h").await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
