//! Wall-clock abstraction
//!
//! Token expiry is a wall-clock instant, so scheduling code asks a [`Clock`]
//! for "now" instead of calling `Utc::now()` directly. Three
//! implementations:
//!
//! - [`SystemClock`]: real time, for production
//! - [`MockClock`]: manually advanced, for pure unit tests
//! - [`RuntimeClock`]: follows the tokio clock, so it advances together with
//!   a paused test runtime

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since the UNIX epoch
    fn millis_since_epoch(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Real system clock. Use this in production code.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use taskdesk_common::time::{Clock, MockClock};
///
/// let clock = MockClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!((clock.now() - start).num_seconds(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Start at the current real time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(start: DateTime<Utc>) -> Self {
        Self { current: Arc::new(Mutex::new(start)) }
    }

    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        let mut current = self.current.lock();
        *current = current.checked_add_signed(step).unwrap_or(*current);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock() = instant;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

/// Wall clock anchored to tokio's monotonic clock.
///
/// Under `tokio::time::pause()` the runtime clock only moves when the test
/// advances it (or auto-advances past sleeping timers), and so does this
/// clock. Outside a paused runtime it tracks real time.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeClock {
    origin_wall: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl RuntimeClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(origin_wall: DateTime<Utc>) -> Self {
        Self { origin_wall, origin: tokio::time::Instant::now() }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RuntimeClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed =
            chrono::Duration::from_std(self.origin.elapsed()).unwrap_or(chrono::Duration::MAX);
        self.origin_wall.checked_add_signed(elapsed).unwrap_or(self.origin_wall)
    }
}
