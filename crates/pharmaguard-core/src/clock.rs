//! Clock abstraction
//!
//! Risk scoring depends on the local hour and weekday, and audit records carry
//! the assembly time. Both read time through [`Clock`] so replays and tests
//! can pin it.

use chrono::{DateTime, FixedOffset, Local};

/// Source of the current local time
pub trait Clock: Send + Sync {
    /// Current time in the local offset
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the host's local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<FixedOffset>);

impl FixedClock {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self(at)
    }

    /// Parse an RFC 3339 timestamp, e.g. `2026-10-17T02:00:00+00:00`
    pub fn parse(rfc3339: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(rfc3339).map(Self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}
