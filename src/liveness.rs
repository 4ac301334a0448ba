//! Liveness monitor
//!
//! Clients call `StayAlive` periodically; once nobody has for
//! `timeout`, the service exits and lets bus activation start a fresh one on
//! the next call. The expiry check is only run every `check_every` loop
//! iterations so a short wait timeout does not turn the clock read into a
//! hot path.

use std::time::{Duration, Instant};

pub struct LivenessMonitor {
    last_activity: Instant,
    timeout: Duration,
    check_every: u32,
    iterations: u32,
}

impl LivenessMonitor {
    pub fn new(timeout: Duration, check_every: u32) -> Self {
        Self {
            last_activity: Instant::now(),
            timeout,
            check_every: check_every.max(1),
            iterations: 0,
        }
    }

    /// Record client activity now
    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&mut self, now: Instant) {
        self.last_activity = now;
    }

    #[cfg(test)]
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// No activity for at least `timeout` as of `now`
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= timeout
    }

    /// Count one loop iteration; true when this one should run the check
    pub fn tick(&mut self) -> bool {
        self.iterations += 1;
        if self.iterations >= self.check_every {
            self.iterations = 0;
            true
        } else {
            false
        }
    }

    /// Cadence-gated expiry check against the configured timeout
    pub fn poll_expired(&mut self) -> bool {
        self.tick() && self.is_expired(Instant::now(), self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(10_000);

    #[test]
    fn test_not_expired_before_deadline() {
        let mut monitor = LivenessMonitor::new(TIMEOUT, 1);
        let t = Instant::now();
        monitor.touch_at(t);

        assert!(!monitor.is_expired(t, TIMEOUT));
        assert!(!monitor.is_expired(t + TIMEOUT - Duration::from_millis(1), TIMEOUT));
        assert!(monitor.is_expired(t + TIMEOUT, TIMEOUT));
        assert!(monitor.is_expired(t + TIMEOUT * 2, TIMEOUT));
    }

    #[test]
    fn test_touch_moves_deadline() {
        let mut monitor = LivenessMonitor::new(TIMEOUT, 1);
        let t = Instant::now();
        monitor.touch_at(t);
        monitor.touch_at(t + Duration::from_millis(6_000));
        monitor.touch_at(t + Duration::from_millis(6_000));

        assert!(!monitor.is_expired(t + TIMEOUT, TIMEOUT));
        assert!(monitor.is_expired(t + Duration::from_millis(16_000), TIMEOUT));
    }

    #[test]
    fn test_clock_before_touch_is_not_expired() {
        let mut monitor = LivenessMonitor::new(TIMEOUT, 1);
        let t = Instant::now() + Duration::from_secs(1);
        monitor.touch_at(t);
        assert!(!monitor.is_expired(Instant::now(), TIMEOUT));
    }

    #[test]
    fn test_cadence() {
        let mut monitor = LivenessMonitor::new(TIMEOUT, 3);
        let due: Vec<bool> = (0..7).map(|_| monitor.tick()).collect();
        assert_eq!(due, vec![false, false, true, false, false, true, false]);

        let mut every = LivenessMonitor::new(TIMEOUT, 0);
        assert!(every.tick());
        assert!(every.tick());
    }

    #[test]
    fn test_poll_expired_with_zero_timeout() {
        let mut monitor = LivenessMonitor::new(Duration::ZERO, 2);
        assert!(!monitor.poll_expired());
        assert!(monitor.poll_expired());
    }
}
