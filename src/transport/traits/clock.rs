//! Clock and watchdog abstractions for the polling loops.

/// Free-running millisecond clock. Wraps at `u32::MAX`; consumers compare
/// readings through [`crate::infra::timing::Deadline`], never directly.
pub trait MillisClock {
    /// Current reading, in milliseconds since an arbitrary epoch.
    fn millis(&mut self) -> u32;
}

/// Free-running 16-bit counter with a 10 µs period, used for Modbus T3.5
/// inter-frame gap detection and for the short driver-enable guard delays.
/// Wraps at `u16::MAX`; consumers compare readings through
/// [`crate::infra::timing::tick_delta`].
pub trait FreeRunningClock {
    /// Current counter reading.
    fn ticks(&mut self) -> u16;
}

/// Watchdog service hook. The links call this inside every wait loop that
/// can last longer than a few microseconds, so enabling a COP watchdog does
/// not reset the system mid-transfer.
pub trait Watchdog {
    /// Feed the watchdog. May be a no-op on systems without one.
    fn service(&mut self);
}
