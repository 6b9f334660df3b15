//! Cross-platform time utilities.
//!
//! Every expiry decision made by the issuer crates reads the current time
//! through a [`Clock`]. Production code uses [`SystemClock`]; tests install a
//! [`ManualClock`] and move it forward explicitly instead of sleeping.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{ConditionalSync, SharedCell};

pub use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current system time.
///
/// Uses `std::time::SystemTime::now()` on native and `web_time::SystemTime::now().to_std()`
/// on WASM.
#[cfg(not(target_arch = "wasm32"))]
pub fn now() -> SystemTime {
    SystemTime::now()
}

/// Returns the current system time.
///
/// Uses `std::time::SystemTime::now()` on native and `web_time::SystemTime::now().to_std()`
/// on WASM.
#[cfg(target_arch = "wasm32")]
pub fn now() -> SystemTime {
    use web_time::web::SystemTimeExt;
    web_time::SystemTime::now().to_std()
}

/// A source of the current UTC time.
pub trait Clock: ConditionalSync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// The wall clock of the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(now())
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying instant, so a test can keep one handle
/// while the code under test owns another.
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use sas_common::{Clock, ManualClock};
///
/// let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
/// let observer = clock.clone();
///
/// clock.advance(TimeDelta::minutes(5));
/// assert_eq!(observer.now(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<SharedCell<DateTime<Utc>>>);

impl ManualClock {
    /// Creates a clock frozen at `time`.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self(Arc::new(SharedCell::new(time)))
    }

    /// Moves the clock to `time`, which may be in the past.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.0.write() = time;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut time = self.0.write();
        *time = *time + delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.read()
    }
}
