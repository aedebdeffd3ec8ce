use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Process-wide politeness limiter: requests to one host are spaced at least
/// `interval` apart. Cloning shares the underlying table.
#[derive(Clone, Debug)]
pub struct HostRateLimiter {
    store: Arc<DashMap<String, Instant>>,
    interval: Duration,
}

impl HostRateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            interval,
        }
    }

    /// Reserve the next slot for `host` and sleep until it arrives.
    pub async fn acquire(&self, host: &str) {
        if self.interval.is_zero() {
            return;
        }
        let wait_until = self.reserve(host);
        tokio::time::sleep_until(wait_until).await;
    }

    fn reserve(&self, host: &str) -> Instant {
        let now = Instant::now();
        let key = host.to_ascii_lowercase();

        let mut entry = self.store.entry(key).or_insert(now);
        let next_slot = entry.value_mut();

        // Slot in the past: the host has been idle long enough
        let slot = if *next_slot <= now { now } else { *next_slot };
        *next_slot = slot + self.interval;
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_requests_to_the_same_host() {
        let limiter = HostRateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("firma.de").await;
        limiter.acquire("firma.de").await;
        limiter.acquire("FIRMA.de").await;

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn hosts_do_not_share_slots() {
        let limiter = HostRateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("a.de").await;
        limiter.acquire("b.de").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }
}
