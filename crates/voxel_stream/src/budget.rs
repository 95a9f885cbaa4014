//! Wall-clock deadline for cooperative per-frame budgeting.

use web_time::{Duration, Instant};

/// Point in time after which a batch should stop and defer its remaining work.
///
/// Checked between loop iterations; work in progress is never interrupted.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit: Some(budget),
        }
    }

    /// Deadline `ms` milliseconds from now.
    pub fn after_ms(ms: f64) -> Self {
        Self::after(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }

    /// A deadline that never expires.
    pub fn unbounded() -> Self {
        Self {
            start: Instant::now(),
            limit: None,
        }
    }

    /// Whether the budget has been used up. A zero budget is expired immediately.
    pub fn expired(&self) -> bool {
        match self.limit {
            Some(limit) => limit.is_zero() || self.start.elapsed() >= limit,
            None => false,
        }
    }

    /// Time since the deadline was created, in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_expires() {
        assert!(!Deadline::unbounded().expired());
    }

    #[test]
    fn zero_budget_is_expired() {
        assert!(Deadline::after(Duration::ZERO).expired());
        assert!(Deadline::after_ms(-5.0).expired());
    }

    #[test]
    fn generous_budget_is_not_expired() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.expired());
        assert!(deadline.elapsed_ms() >= 0.0);
    }

    #[test]
    fn expires_after_budget() {
        let deadline = Deadline::after(Duration::from_millis(1));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(deadline.expired());
    }
}
