//! Production clock variants.

use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};

use crate::{Clock, ClockPrecision};

/// The OS wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn precision(&self) -> ClockPrecision {
        ClockPrecision::Standard
    }
}

/// The OS high-precision time source.
///
/// On platforms where the kernel clock is NTP-disciplined at fine
/// granularity, readings come from [`SystemTime`] and the clock reports
/// [`ClockPrecision::Synchronized`]. Where the probe observes only coarse
/// steps, the clock degrades to standard readings and reports
/// [`ClockPrecision::Standard`]; callers never need to care which happened.
#[derive(Debug, Clone, Copy)]
pub struct SynchronizedClock {
    fine: bool,
}

impl SynchronizedClock {
    /// Probe the platform source and construct the clock.
    pub fn acquire() -> Self {
        Self {
            fine: Self::probe_fine_source(),
        }
    }

    /// Take a handful of paired readings; the source is fine-grained when
    /// consecutive readings ever differ by a microsecond or less.
    fn probe_fine_source() -> bool {
        const SAMPLES: usize = 8;
        let mut best = Duration::MAX;
        for _ in 0..SAMPLES {
            let a = SystemTime::now();
            let b = SystemTime::now();
            if let Ok(delta) = b.duration_since(a) {
                if !delta.is_zero() && delta < best {
                    best = delta;
                }
            }
        }
        best <= Duration::from_micros(1)
    }
}

impl Clock for SynchronizedClock {
    fn now(&self) -> DateTime<Utc> {
        if self.fine {
            DateTime::<Utc>::from(SystemTime::now())
        } else {
            Utc::now()
        }
    }

    fn precision(&self) -> ClockPrecision {
        if self.fine {
            ClockPrecision::Synchronized
        } else {
            ClockPrecision::Standard
        }
    }
}

/// A wall reading captured once, advanced by a monotonic counter.
///
/// Readings never go backwards and are as fine-grained as the platform's
/// monotonic clock, but drift from the wall clock is not corrected after
/// construction.
#[derive(Debug, Clone, Copy)]
pub struct FastClock {
    base_wall: DateTime<Utc>,
    base_mono: Instant,
}

impl FastClock {
    /// Capture the wall clock and start the monotonic offset.
    pub fn new() -> Self {
        Self {
            base_wall: Utc::now(),
            base_mono: Instant::now(),
        }
    }
}

impl Default for FastClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FastClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.base_mono.elapsed();
        self.base_wall
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn precision(&self) -> ClockPrecision {
        ClockPrecision::Fast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_synchronized_clock_reports_a_precision() {
        let clock = SynchronizedClock::acquire();
        // Either answer is valid; the fallback must be transparent.
        assert!(matches!(
            clock.precision(),
            ClockPrecision::Synchronized | ClockPrecision::Standard
        ));
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_fast_clock_is_monotonic() {
        let clock = FastClock::new();
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.now();
        assert!(b > a);
        assert_eq!(clock.precision(), ClockPrecision::Fast);
    }

    #[test]
    fn test_fast_clock_tracks_wall_clock_roughly() {
        let clock = FastClock::new();
        let wall = Utc::now();
        let fast = clock.now();
        let skew = (wall - fast).num_milliseconds().abs();
        assert!(skew < 1_000, "skew was {skew} ms");
    }
}
