//! Navigation pacing for one worker.
//!
//! Consecutive navigations of the same worker are spaced at least `delay`
//! apart, plus a random jitter so parallel workers drift out of step. Time
//! already spent fetching and parsing counts towards the spacing.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum spacing between two navigations of one worker.
    pub delay: Duration,
    /// Upper bound (exclusive) of the random extra spacing.
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero() && self.jitter.is_zero()
    }

    fn spacing(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.delay;
        }
        let roll = (uuid::Uuid::new_v4().as_u128() % u128::from(jitter_ms)) as u64;
        self.delay + Duration::from_millis(roll)
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            jitter: Duration::from_secs(3),
        }
    }
}

/// Per-worker pacing state. The first navigation is never delayed.
#[derive(Debug)]
pub struct Pacer {
    config: ThrottleConfig,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config, last: None }
    }

    /// Wait until the next navigation is allowed, then mark it as started.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last
            && !self.config.is_disabled()
        {
            let ready_at = last + self.config.spacing();
            if ready_at > Instant::now() {
                tracing::trace!(
                    wait_ms = %ready_at.saturating_duration_since(Instant::now()).as_millis(),
                    "Pacing navigation"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_with_jitter_stays_in_range() {
        let config =
            ThrottleConfig::new(Duration::from_millis(100)).with_jitter(Duration::from_millis(50));
        for _ in 0..200 {
            let d = config.spacing();
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_navigation_is_immediate() {
        let mut pacer = Pacer::new(ThrottleConfig::new(Duration::from_secs(3)));
        let start = Instant::now();
        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_navigations_are_spaced() {
        let mut pacer = Pacer::new(ThrottleConfig::new(Duration::from_secs(3)));
        pacer.wait().await;
        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_work_counts_towards_spacing() {
        let mut pacer = Pacer::new(ThrottleConfig::new(Duration::from_secs(3)));
        pacer.wait().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let start = Instant::now();
        pacer.wait().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(1));
        assert!(waited < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_never_waits() {
        let mut pacer = Pacer::new(ThrottleConfig::disabled());
        let start = Instant::now();
        for _ in 0..5 {
            pacer.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
