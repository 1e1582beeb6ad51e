//! Timezone lookup.

use chrono_tz::Tz;

use crate::error::{ScheduleError, ScheduleResult};

/// Resolves IANA timezone names to zone values.
///
/// The scheduler consumes the timezone database through this seam; the
/// default implementation is backed by the bundled IANA data.
pub trait TimeZoneProvider: Send + Sync {
    /// Resolve a zone by IANA name, e.g. `"Australia/Lord_Howe"`.
    fn resolve(&self, name: &str) -> ScheduleResult<Tz>;
}

/// The bundled IANA timezone database.
#[derive(Debug, Clone, Copy, Default)]
pub struct TzDatabase;

impl TzDatabase {
    pub fn new() -> Self {
        Self
    }
}

impl TimeZoneProvider for TzDatabase {
    fn resolve(&self, name: &str) -> ScheduleResult<Tz> {
        name.parse::<Tz>()
            .map_err(|_| ScheduleError::UnknownTimeZone(name.to_string()))
    }
}
