use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall clock timestamps.
///
/// Probe timestamps and bucket boundaries are all derived from a single
/// nanosecond wall clock so that tests can substitute a fixed clock.
pub trait Clock: Debug + Send + Sync {
    /// The current wall clock time in nanoseconds since the UNIX epoch.
    fn now_ns(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as i64)
    }
}
