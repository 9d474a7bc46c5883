//! Wrap-safe time arithmetic for the polling loops.
//!
//! The links never compare raw clock readings. Millisecond deadlines go
//! through [`Deadline`], and the 10 µs free-running counter used for Modbus
//! inter-frame gaps goes through [`tick_delta`]. Both rely on wrapping
//! subtraction, so counter rollover between two polls cannot produce a stall
//! or a spurious expiry.

/// Resolution of the free-running counter, in microseconds per tick.
pub const TICK_PERIOD_US: u16 = 10;

/// Elapsed ticks between two readings of the 16-bit free-running counter.
/// Valid as long as fewer than 65536 ticks (655 ms) separate the readings.
pub fn tick_delta(now: u16, since: u16) -> u16 {
    now.wrapping_sub(since)
}

/// Convert a microsecond duration to free-running ticks, rounding up and
/// adding one tick so the wait never undershoots the requested duration.
pub fn us_to_ticks(us: u16) -> u16 {
    let rounded = us / TICK_PERIOD_US + u16::from(us % TICK_PERIOD_US != 0);
    rounded + 1
}

/// Millisecond deadline anchored at a clock reading.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: u32,
    timeout_ms: u32,
}

impl Deadline {
    /// Arm a deadline `timeout_ms` milliseconds after the reading `now`.
    pub const fn after(now: u32, timeout_ms: u32) -> Self {
        Self {
            start: now,
            timeout_ms,
        }
    }

    /// `true` once strictly more than the budgeted time has elapsed.
    pub fn expired(&self, now: u32) -> bool {
        now.wrapping_sub(self.start) > self.timeout_ms
    }
}
