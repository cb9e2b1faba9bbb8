//! Shared recording clock

use std::time::{Duration, Instant};

/// Zero point for event timestamps.
///
/// Both recorders of a session are built from the same `Clock`, so their
/// timestamps share one origin and can be merged directly.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn now() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self { start }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    /// Seconds since the zero point
    pub fn elapsed(&self) -> f64 {
        self.seconds_at(Instant::now())
    }

    /// Seconds from the zero point to `at`, 0 for instants before it
    pub fn seconds_at(&self, at: Instant) -> f64 {
        at.saturating_duration_since(self.start).as_secs_f64()
    }

    pub fn instant_at(&self, seconds: f64) -> Instant {
        self.start + Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::now()
    }
}
