//! # cadenza-clock
//!
//! Swappable time sources for the cadenza scheduler.
//!
//! Every component that needs the current time asks a [`Clock`] instead of
//! reading the OS clock directly. This is what makes the scheduler testable:
//! tests substitute a [`VirtualClock`] and drive time explicitly, so due-time
//! arithmetic, alignment, and the tick loop can be exercised without real
//! sleeps.
//!
//! ## Variants
//!
//! - [`SystemClock`]: the OS wall clock, ~100 ns granularity.
//! - [`SynchronizedClock`]: the high-precision, NTP-disciplined source when
//!   the platform offers one; transparently falls back to standard readings.
//! - [`FastClock`]: a wall reading captured at construction plus a monotonic
//!   offset. Cheap and high-resolution, but not NTP-disciplined after start.
//! - [`VirtualClock`]: a pure `f(last) -> next` function with a retained
//!   last reading. Test-only in spirit, but carries no test-only gating so
//!   embedders can simulate time too.

mod system;
mod virtual_clock;

pub use system::{FastClock, SynchronizedClock, SystemClock};
pub use virtual_clock::VirtualClock;

use chrono::{DateTime, Utc};

/// Precision class reported by a [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockPrecision {
    /// Monotonic-offset readings; high resolution, not NTP-disciplined.
    Fast,
    /// OS wall clock, ~100 ns granularity.
    Standard,
    /// OS high-precision source, disciplined to <= 1 microsecond.
    Synchronized,
}

/// A source of the current instant.
///
/// Implementations must be cheap to query; the scheduler asks for the time
/// several times per tick-loop iteration.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;

    /// The precision class of this source.
    fn precision(&self) -> ClockPrecision;
}
