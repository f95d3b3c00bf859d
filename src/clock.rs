//! Abstracted time source for the engine.
//!
//! Nothing outside this module may call `chrono::Utc::now()` or read the
//! system clock directly — see the "Global scheduler state" redesign note
//! in the spec. Tests inject [`FakeClock`] for fully deterministic runs.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::trigger::CronParseError;

/// A single abstracted source of "now" and of calendar-to-instant resolution.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as epoch milliseconds.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Resolve a 5-field cron expression in `tz` (or host local, if `None`)
    /// to the earliest instant strictly after `after`.
    fn resolve_cron(
        &self,
        expr: &str,
        tz: Option<&str>,
        after: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, CronParseError> {
        crate::trigger::cron::next_after(expr, tz, after)
    }
}

/// Production clock backed by the system wall clock.
///
/// `now()` is monotonic within a process because `Utc::now()` itself never
/// decreases on any platform we target; no extra clamping is required.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests. Starts at a fixed instant and only moves
/// forward when [`FakeClock::advance`] is called, enforcing the "never
/// decreases" guarantee by construction.
#[derive(Clone)]
pub struct FakeClock {
    millis: Arc<AtomicI64>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Move the clock forward by `duration`. Panics if `duration` is negative.
    pub fn advance(&self, duration: chrono::Duration) {
        let ms = duration.num_milliseconds();
        assert!(ms >= 0, "FakeClock only moves forward");
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump directly to `at`. Panics if `at` is before the current instant.
    pub fn set(&self, at: DateTime<Utc>) {
        let new_ms = at.timestamp_millis();
        let prev = self.millis.swap(new_ms, Ordering::SeqCst);
        assert!(new_ms >= prev, "FakeClock only moves forward");
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::SeqCst))
            .single()
            .expect("fake clock millis always valid")
    }
}
