//! Injected time source.
//!
//! Tracking redirects embed a fresh timestamp into each pixel URL so that
//! proxy caches never serve a stale image. The clock is a trait so tests can
//! pin or step time deterministically.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that starts at a fixed instant and advances by a fixed step on
/// every read. Only useful in tests, but lives here so every crate's tests
/// can share it.
#[derive(Debug, Clone)]
pub struct SteppingClock {
    current_ms: Arc<AtomicI64>,
    step_ms: i64,
}

impl SteppingClock {
    pub fn new(start_ms: i64, step_ms: i64) -> Self {
        Self {
            current_ms: Arc::new(AtomicI64::new(start_ms)),
            step_ms,
        }
    }

    /// A clock pinned to a single instant.
    pub fn fixed(at_ms: i64) -> Self {
        Self::new(at_ms, 0)
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.current_ms.fetch_add(self.step_ms, Ordering::SeqCst);
        match Utc.timestamp_millis_opt(ms).single() {
            Some(dt) => dt,
            None => Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stepping_clock_is_monotone() {
        let clock = SteppingClock::new(1_700_000_000_000, 250);
        let a = clock.now_ms();
        let b = clock.now_ms();
        let c = clock.now_ms();
        assert_eq!(a, 1_700_000_000_000);
        assert_eq!(b, 1_700_000_000_250);
        assert_eq!(c, 1_700_000_000_500);
    }

    #[test]
    fn test_fixed_clock_repeats() {
        let clock = SteppingClock::fixed(42_000);
        assert_eq!(clock.now_ms(), 42_000);
        assert_eq!(clock.now_ms(), 42_000);
    }
}
