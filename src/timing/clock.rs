use std::time::Duration;

/// Wall-clock reading in microseconds from an arbitrary origin. The host
/// decides the origin; only differences matter to the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Timestamp(f64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0.0);

    pub fn from_micros(us: f64) -> Self {
        Self(us)
    }

    pub fn from_millis(ms: f64) -> Self {
        Self(ms * 1000.0)
    }

    pub fn as_micros(self) -> f64 {
        self.0
    }
}

impl From<Duration> for Timestamp {
    fn from(elapsed: Duration) -> Self {
        Self(elapsed.as_secs_f64() * 1_000_000.0)
    }
}
