use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Monotonic session time in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Seconds since construction. Follows tokio's paused clock in tests.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) -> f64 {
        let next = self.now() + seconds;
        self.set(next);
        next
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1.5);
        let other = clock.clone();
        clock.advance(0.25);
        assert_eq!(other.now(), 1.75);
        other.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_follows_paused_time() {
        let clock = SystemClock::new();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let now = clock.now();
        assert!((now - 1.5).abs() < 1e-3, "now = {}", now);
    }
}
